//! Unified error types for the Overlink core
//!
//! External collaborators (bridges, handshake transports, discovery sources)
//! report failures through `CoreError`; the crypto and network crates convert
//! it into their own error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type shared by every Overlink crate
#[derive(Debug, Error)]
pub enum CoreError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),

    /// Cryptographic errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Transport layer errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Peer refused a handshake
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Bridge invocation errors
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation timeout
    #[error("Timeout")]
    Timeout,

    /// Invalid input/state
    #[error("Invalid: {0}")]
    Invalid(String),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        CoreError::Network(msg.into())
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        CoreError::Crypto(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        CoreError::Transport(msg.into())
    }

    /// Create a handshake rejection
    pub fn handshake_rejected<S: Into<String>>(msg: S) -> Self {
        CoreError::HandshakeRejected(msg.into())
    }

    /// Create a bridge error
    pub fn bridge<S: Into<String>>(msg: S) -> Self {
        CoreError::Bridge(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        CoreError::Serialization(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        CoreError::Configuration(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Create an invalid error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::Invalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = CoreError::network("test");
        assert!(matches!(err, CoreError::Network(_)));

        let err = CoreError::handshake_rejected("peer busy");
        assert!(matches!(err, CoreError::HandshakeRejected(_)));

        let err = CoreError::configuration("bad");
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::bridge("ledger offline");
        assert_eq!(err.to_string(), "Bridge error: ledger offline");

        let err = CoreError::Timeout;
        assert_eq!(err.to_string(), "Timeout");
    }

    #[test]
    fn test_serialization_error_from_toml() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("key = ");
        let err = CoreError::serialization(parsed.unwrap_err().to_string());
        assert!(matches!(err, CoreError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error: "));
    }
}
