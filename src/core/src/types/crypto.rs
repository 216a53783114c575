//! Key and signature wrappers carried inside messages and handshakes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Public key bytes (Ed25519 verifying key or X25519 public value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    /// Create a new public key
    pub fn new(bytes: Vec<u8>) -> Self {
        PublicKey(bytes)
    }

    /// Get the public key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to a fixed 32-byte array, if the length matches
    pub fn to_array(&self) -> Option<[u8; 32]> {
        self.0.as_slice().try_into().ok()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        if hex.len() > 16 {
            write!(f, "{}...{}", &hex[..8], &hex[hex.len() - 8..])
        } else {
            write!(f, "{}", hex)
        }
    }
}

/// Digital signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Create a new signature
    pub fn new(bytes: Vec<u8>) -> Self {
        Signature(bytes)
    }

    /// Get the signature as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Mutable access, used by tamper tests and fault injection
    pub fn as_bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        if hex.len() > 16 {
            write!(f, "{}...{}", &hex[..8], &hex[hex.len() - 8..])
        } else {
            write!(f, "{}", hex)
        }
    }
}
