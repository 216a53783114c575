//! Error types for the security layer

use overlink_core::CoreError;
use thiserror::Error;

/// Result type alias for security operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur in key handling, handshakes and message sealing
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Operation attempted before `initialize`
    #[error("Security manager not initialized")]
    NotInitialized,

    /// Malformed or unsupported configuration
    #[error("Invalid security configuration: {0}")]
    ConfigInvalid(String),

    /// Peer rejected the handshake, answered badly, or timed out
    #[error("Handshake with {node} failed: {reason}")]
    HandshakeFailed { node: String, reason: String },

    /// No usable session for the node
    #[error("No active session for node {0}")]
    NoActiveSession(String),

    /// Signature missing, malformed or not matching
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// AEAD open failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// AEAD seal failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Message is not in a state that allows the operation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid key format
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl CryptoError {
    pub(crate) fn handshake<N: ToString, R: ToString>(node: N, reason: R) -> Self {
        CryptoError::HandshakeFailed {
            node: node.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<CoreError> for CryptoError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(msg) => CryptoError::ConfigInvalid(msg),
            other => CryptoError::ConfigInvalid(other.to_string()),
        }
    }
}
