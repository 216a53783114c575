use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use overlink_core::{PublicKey, Signature};
use rand::RngCore;
use zeroize::Zeroize;

/// Ed25519 signing key pair.
///
/// Used both for the long-lived node identity and for per-session signing
/// keys. The secret half never leaves this type.
pub struct SigningKeyPair {
    signing: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let pair = Self::from_seed(&seed);
        seed.zeroize();
        pair
    }

    /// Derive a key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Derive a key pair from a hex-encoded 32-byte seed
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self> {
        let mut bytes = hex::decode(seed_hex.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("master key seed is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "master key seed must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        bytes.zeroize();
        Ok(Self::from_seed(&seed))
    }

    /// Public (verifying) key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.signing.verifying_key().to_bytes().to_vec())
    }

    /// Sign data
    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature::new(self.signing.sign(data).to_bytes().to_vec())
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &self.public_key().to_string())
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature
pub fn verify_signature(public_key: &PublicKey, data: &[u8], signature: &Signature) -> Result<()> {
    let key_bytes = public_key
        .to_array()
        .ok_or_else(|| CryptoError::InvalidKey("public key must be 32 bytes".to_string()))?;
    let verifying = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKey(format!("malformed public key: {}", e)))?;

    let sig_bytes: [u8; 64] = signature.as_bytes().try_into().map_err(|_| {
        CryptoError::SignatureInvalid(format!(
            "signature must be 64 bytes, got {}",
            signature.as_bytes().len()
        ))
    })?;
    let sig = Ed25519Signature::from_bytes(&sig_bytes);

    verifying
        .verify(data, &sig)
        .map_err(|_| CryptoError::SignatureInvalid("signature does not match".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let pair = SigningKeyPair::generate();
        let sig = pair.sign(b"message");
        assert!(verify_signature(&pair.public_key(), b"message", &sig).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let sig = a.sign(b"message");
        assert!(matches!(
            verify_signature(&b.public_key(), b"message", &sig),
            Err(CryptoError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let pair = SigningKeyPair::generate();
        let mut sig = pair.sign(b"message");
        sig.as_bytes_mut().truncate(10);
        assert!(matches!(
            verify_signature(&pair.public_key(), b"message", &sig),
            Err(CryptoError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let seed_hex = "11".repeat(32);
        let a = SigningKeyPair::from_hex_seed(&seed_hex).unwrap();
        let b = SigningKeyPair::from_seed(&[0x11; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_bad_seed_rejected() {
        assert!(SigningKeyPair::from_hex_seed("zz").is_err());
        assert!(SigningKeyPair::from_hex_seed("abcd").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let pair = SigningKeyPair::from_seed(&[9; 32]);
        let shown = format!("{:?}", pair);
        assert!(shown.contains("public_key"));
        assert!(!shown.contains("signing"));
    }
}
