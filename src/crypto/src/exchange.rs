//! Ephemeral X25519 key agreement and session key derivation

use crate::error::{CryptoError, Result};
use overlink_core::PublicKey;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// BLAKE3 `derive_key` context for session keys
const SESSION_KEY_CONTEXT: &str = "overlink 2024-01-01 session key v1";

/// Symmetric session key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// One side of an ephemeral Diffie-Hellman exchange.
///
/// The secret is consumed by [`EphemeralExchange::agree`], so each value is
/// used for exactly one session.
pub struct EphemeralExchange {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralExchange {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Our public value, sent to the peer
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.public.as_bytes().to_vec())
    }

    /// Combine with the peer's public value and bind the result to the
    /// handshake transcript digest.
    pub fn agree(self, peer: &PublicKey, transcript: &[u8; 32]) -> Result<SessionKey> {
        let peer_bytes = peer
            .to_array()
            .ok_or_else(|| CryptoError::InvalidKey("exchange key must be 32 bytes".to_string()))?;
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(peer_bytes));

        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey(
                "peer exchange key is a low-order point".to_string(),
            ));
        }

        let mut material = Vec::with_capacity(64);
        material.extend_from_slice(shared.as_bytes());
        material.extend_from_slice(transcript);
        let key = blake3::derive_key(SESSION_KEY_CONTEXT, &material);
        material.zeroize();

        Ok(SessionKey(key))
    }
}
