//! Authenticated encryption for session payloads
//!
//! Supports AES-GCM (128/256) and ChaCha20-Poly1305, all with 96-bit nonces.
//! The session key is always 32 bytes; 128-bit suites use its first half.

use crate::error::{CryptoError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use std::fmt;

/// Nonce length shared by every supported suite
pub const NONCE_LEN: usize = 12;

/// Supported AEAD suites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    Aes256Gcm,
    Aes128Gcm,
    ChaCha20Poly1305,
}

impl CipherSuite {
    /// Resolve a configured algorithm name and key size.
    ///
    /// Names are matched case-insensitively and ignore `-`/`_`.
    pub fn from_config(name: &str, key_size_bits: u32) -> Result<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        let suite = match normalized.as_str() {
            "aes256gcm" => CipherSuite::Aes256Gcm,
            "aes128gcm" => CipherSuite::Aes128Gcm,
            "chacha20poly1305" => CipherSuite::ChaCha20Poly1305,
            "aesgcm" => match key_size_bits {
                128 => CipherSuite::Aes128Gcm,
                _ => CipherSuite::Aes256Gcm,
            },
            _ => {
                return Err(CryptoError::ConfigInvalid(format!(
                    "unsupported encryption algorithm: {}",
                    name
                )))
            }
        };

        if suite.key_size_bits() != key_size_bits {
            return Err(CryptoError::ConfigInvalid(format!(
                "{} requires a {}-bit key, configured {}",
                suite.name(),
                suite.key_size_bits(),
                key_size_bits
            )));
        }

        Ok(suite)
    }

    /// Canonical algorithm name, recorded in message metadata
    pub fn name(&self) -> &'static str {
        match self {
            CipherSuite::Aes256Gcm => "AES-256-GCM",
            CipherSuite::Aes128Gcm => "AES-128-GCM",
            CipherSuite::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    pub fn key_size_bits(&self) -> u32 {
        match self {
            CipherSuite::Aes128Gcm => 128,
            CipherSuite::Aes256Gcm | CipherSuite::ChaCha20Poly1305 => 256,
        }
    }

    fn key_len(&self) -> usize {
        self.key_size_bits() as usize / 8
    }

    fn key_slice<'a>(&self, key: &'a [u8]) -> Result<&'a [u8]> {
        key.get(..self.key_len()).ok_or_else(|| {
            CryptoError::InvalidKey(format!(
                "{} needs {} key bytes, got {}",
                self.name(),
                self.key_len(),
                key.len()
            ))
        })
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it
    pub fn seal(&self, key: &[u8], nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::EncryptionFailed(format!(
                "nonce must be {} bytes",
                NONCE_LEN
            )));
        }
        let key = self.key_slice(key)?;
        let payload = Payload { msg: plaintext, aad };
        let nonce = Nonce::from_slice(nonce);

        let sealed = match self {
            CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .encrypt(nonce, payload),
            CipherSuite::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .encrypt(nonce, payload),
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .encrypt(nonce, payload),
        };

        sealed.map_err(|e| CryptoError::EncryptionFailed(format!("{} seal failed: {}", self.name(), e)))
    }

    /// Decrypt and authenticate `ciphertext`
    pub fn open(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::DecryptionFailed(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }
        let key = self.key_slice(key)?;
        let payload = Payload { msg: ciphertext, aad };
        let nonce = Nonce::from_slice(nonce);

        let opened = match self {
            CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .decrypt(nonce, payload),
            CipherSuite::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .decrypt(nonce, payload),
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .decrypt(nonce, payload),
        };

        opened.map_err(|_| {
            CryptoError::DecryptionFailed(format!("{} authentication tag mismatch", self.name()))
        })
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generate a random nonce
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 32] = [42u8; 32];

    #[test]
    fn test_from_config() {
        assert_eq!(
            CipherSuite::from_config("AES-256-GCM", 256).unwrap(),
            CipherSuite::Aes256Gcm
        );
        assert_eq!(
            CipherSuite::from_config("aes_128_gcm", 128).unwrap(),
            CipherSuite::Aes128Gcm
        );
        assert_eq!(
            CipherSuite::from_config("chacha20-poly1305", 256).unwrap(),
            CipherSuite::ChaCha20Poly1305
        );
        assert_eq!(CipherSuite::from_config("AES-GCM", 128).unwrap(), CipherSuite::Aes128Gcm);
    }

    #[test]
    fn test_from_config_rejects_bad_settings() {
        assert!(matches!(
            CipherSuite::from_config("base64", 256),
            Err(CryptoError::ConfigInvalid(_))
        ));
        assert!(matches!(
            CipherSuite::from_config("AES-256-GCM", 128),
            Err(CryptoError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let nonce = generate_nonce();
        let mut sealed = CipherSuite::Aes256Gcm.seal(&KEY, &nonce, b"payload", b"aad").unwrap();
        sealed[0] ^= 0x01;
        let result = CipherSuite::Aes256Gcm.open(&KEY, &nonce, &sealed, b"aad");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let nonce = generate_nonce();
        let sealed = CipherSuite::ChaCha20Poly1305
            .seal(&KEY, &nonce, b"payload", b"header-a")
            .unwrap();
        assert!(CipherSuite::ChaCha20Poly1305
            .open(&KEY, &nonce, &sealed, b"header-b")
            .is_err());
    }

    #[test]
    fn test_short_nonce_rejected() {
        let result = CipherSuite::Aes128Gcm.open(&KEY, &[0u8; 8], b"whatever", b"");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_nonces_differ() {
        assert_ne!(generate_nonce(), generate_nonce());
    }

    proptest! {
        #[test]
        fn prop_seal_open_recovers_plaintext(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            aad in proptest::collection::vec(any::<u8>(), 0..64),
            suite_idx in 0usize..3,
        ) {
            let suite = [
                CipherSuite::Aes256Gcm,
                CipherSuite::Aes128Gcm,
                CipherSuite::ChaCha20Poly1305,
            ][suite_idx];
            let nonce = generate_nonce();
            let sealed = suite.seal(&KEY, &nonce, &plaintext, &aad).unwrap();
            prop_assert_eq!(sealed.len(), plaintext.len() + 16);
            let opened = suite.open(&KEY, &nonce, &sealed, &aad).unwrap();
            prop_assert_eq!(opened, plaintext);
        }
    }
}
