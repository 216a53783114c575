//! Session state between the local node and one peer

use crate::exchange::SessionKey;
use crate::keys::SigningKeyPair;
use chrono::{DateTime, Utc};
use overlink_core::{NodeId, PublicKey};
use serde::{Deserialize, Serialize};

/// Authenticated, encrypted channel state. Owned by the security manager.
#[derive(Debug)]
pub(crate) struct Session {
    pub session_id: String,
    pub node_id: NodeId,

    /// Our per-session signing key
    pub signing_key: SigningKeyPair,

    /// Peer's per-session verifying key from the handshake
    pub peer_public_key: PublicKey,

    pub symmetric_key: SessionKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    /// Active and not yet past its expiry
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            node_id: self.node_id.clone(),
            public_key: self.signing_key.public_key(),
            peer_public_key: self.peer_public_key.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_active: self.is_usable(Utc::now()),
        }
    }
}

/// Key-free view of a session, safe to hand to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub node_id: NodeId,
    pub public_key: PublicKey,
    pub peer_public_key: PublicKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Result of one expiry scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Sessions that just became inactive
    pub expired: usize,
    /// Inactive sessions dropped after the grace period
    pub purged: usize,
}

/// Read-only snapshot of security state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityStats {
    /// Peers whose identity key has been pinned
    pub known_node_keys: usize,
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub algorithm: String,
    pub key_size_bits: u32,
    pub session_timeout_hours: f64,
}
