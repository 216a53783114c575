//! Error types for the network module

use overlink_core::CoreError;
use overlink_crypto::CryptoError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Pipeline stage an error surfaced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Startup,
    Handshake,
    Encrypt,
    Route,
    Forward,
    Decrypt,
    Bridge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Startup => "startup",
            Stage::Handshake => "handshake",
            Stage::Encrypt => "encrypt",
            Stage::Route => "route",
            Stage::Forward => "forward",
            Stage::Decrypt => "decrypt",
            Stage::Bridge => "bridge",
        };
        f.write_str(s)
    }
}

/// Root cause category, independent of stage wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotInitialized,
    InvalidNetworkState,
    HandshakeFailed,
    NoActiveSession,
    SignatureInvalid,
    DecryptionFailed,
    RouteNotFound,
    DeliveryFailed,
    BridgeNotFound,
    BridgeFailed,
    ConfigInvalid,
    InvalidMessage,
    Crypto,
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Security layer not initialized")]
    NotInitialized,

    #[error("Cannot {operation} while network is {state}")]
    InvalidNetworkState { operation: String, state: String },

    #[error("Handshake with {node} failed: {reason}")]
    HandshakeFailed { node: String, reason: String },

    #[error("No active session for node {0}")]
    NoActiveSession(String),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("No route to {target}: {reason}")]
    RouteNotFound { target: String, reason: String },

    #[error("Delivery of {message_id} failed at hop {hop}: {reason}")]
    DeliveryFailed {
        message_id: String,
        hop: String,
        reason: String,
    },

    #[error("No bridge advertises capability {0}")]
    BridgeNotFound(String),

    #[error("Bridge {bridge} failed: {reason}")]
    BridgeFailed { bridge: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigInvalid(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Wraps an error with the stage it surfaced from
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        source: Box<NetworkError>,
    },
}

impl NetworkError {
    pub(crate) fn invalid_state(operation: &str, state: impl fmt::Display) -> Self {
        NetworkError::InvalidNetworkState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }

    pub(crate) fn route_not_found(target: impl fmt::Display, reason: impl Into<String>) -> Self {
        NetworkError::RouteNotFound {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap with the failing stage. Already-staged errors keep their
    /// innermost stage.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            staged @ NetworkError::Stage { .. } => staged,
            other => NetworkError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The error with every stage wrapper removed
    pub fn root(&self) -> &NetworkError {
        match self {
            NetworkError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage the error surfaced from, if it was wrapped
    pub fn stage(&self) -> Option<Stage> {
        match self {
            NetworkError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::Stage { source, .. } => source.kind(),
            NetworkError::NotInitialized => ErrorKind::NotInitialized,
            NetworkError::InvalidNetworkState { .. } => ErrorKind::InvalidNetworkState,
            NetworkError::HandshakeFailed { .. } => ErrorKind::HandshakeFailed,
            NetworkError::NoActiveSession(_) => ErrorKind::NoActiveSession,
            NetworkError::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            NetworkError::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            NetworkError::RouteNotFound { .. } => ErrorKind::RouteNotFound,
            NetworkError::DeliveryFailed { .. } => ErrorKind::DeliveryFailed,
            NetworkError::BridgeNotFound(_) => ErrorKind::BridgeNotFound,
            NetworkError::BridgeFailed { .. } => ErrorKind::BridgeFailed,
            NetworkError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            NetworkError::InvalidMessage(_) => ErrorKind::InvalidMessage,
            NetworkError::Crypto(_) => ErrorKind::Crypto,
        }
    }
}

/// Attach a stage to the error side of a result
pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T, E: Into<NetworkError>> StageExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.into().at(stage))
    }
}

impl From<CryptoError> for NetworkError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::NotInitialized => NetworkError::NotInitialized,
            CryptoError::ConfigInvalid(msg) => NetworkError::ConfigInvalid(msg),
            CryptoError::HandshakeFailed { node, reason } => {
                NetworkError::HandshakeFailed { node, reason }
            }
            CryptoError::NoActiveSession(node) => NetworkError::NoActiveSession(node),
            CryptoError::SignatureInvalid(msg) => NetworkError::SignatureInvalid(msg),
            CryptoError::DecryptionFailed(msg) => NetworkError::DecryptionFailed(msg),
            CryptoError::InvalidMessage(msg) => NetworkError::InvalidMessage(msg),
            other @ (CryptoError::EncryptionFailed(_) | CryptoError::InvalidKey(_)) => {
                NetworkError::Crypto(other.to_string())
            }
        }
    }
}

impl From<CoreError> for NetworkError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(msg) => NetworkError::ConfigInvalid(msg),
            other => NetworkError::ConfigInvalid(other.to_string()),
        }
    }
}
