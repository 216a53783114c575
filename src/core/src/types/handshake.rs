//! Session handshake messages
//!
//! The initiator sends a [`HandshakeOffer`]; the responder answers with a
//! [`HandshakeReply`]. Both sides sign the transcript with their long-lived
//! identity key, which gives mutual authentication, and exchange ephemeral
//! X25519 values from which the session key is derived.

use crate::types::crypto::{PublicKey, Signature};
use crate::types::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// First handshake message, sent by the initiator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeOffer {
    /// Node starting the handshake
    pub initiator: NodeId,

    /// Node the offer is addressed to
    pub responder: NodeId,

    /// Initiator's long-lived Ed25519 identity key
    pub identity_key: PublicKey,

    /// Initiator's per-session Ed25519 signing key
    pub session_key: PublicKey,

    /// Initiator's ephemeral X25519 public value
    pub exchange_key: PublicKey,

    /// Random challenge, echoed into the reply transcript
    pub nonce: Vec<u8>,

    pub timestamp: DateTime<Utc>,

    /// Identity signature over the offer fields
    pub signature: Signature,
}

/// Second handshake message, sent by the responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub responder: NodeId,

    /// Responder's long-lived Ed25519 identity key
    pub identity_key: PublicKey,

    /// Responder's per-session Ed25519 signing key
    pub session_key: PublicKey,

    /// Responder's ephemeral X25519 public value
    pub exchange_key: PublicKey,

    pub timestamp: DateTime<Utc>,

    /// Identity signature over the offer and reply fields
    pub signature: Signature,
}
