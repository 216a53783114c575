//! Application message envelope

use crate::types::crypto::Signature;
use crate::types::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of payload carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Data,
    Control,
    Discovery,
    Bridge,
}

/// Message priority. Higher levels may use longer routes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum MessagePriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl MessagePriority {
    /// Numeric priority level
    pub fn level(self) -> usize {
        self as usize
    }
}

/// Delivery state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Encrypted,
    Delivered,
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Encrypted => "encrypted",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Security envelope attached by the sender's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetadata {
    /// AEAD algorithm name
    pub algorithm: String,

    /// Identifier of the session key used
    pub key_id: String,

    /// Time the message was sealed
    pub timestamp: DateTime<Utc>,

    /// AEAD nonce
    pub nonce: Vec<u8>,

    /// Signature over the sealed message
    pub signature: Signature,
}

/// Message routed through the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,

    /// Plaintext before encryption, ciphertext afterwards
    pub content: Vec<u8>,

    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_status: DeliveryStatus,

    /// Hops traversed so far, in order
    pub routing_path: Vec<NodeId>,

    pub security: Option<SecurityMetadata>,
}

impl Message {
    /// Create a pending data message
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, content: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
            content,
            message_type: MessageType::Data,
            priority: MessagePriority::Normal,
            created_at: Utc::now(),
            delivered_at: None,
            delivery_status: DeliveryStatus::Pending,
            routing_path: Vec::new(),
            security: None,
        }
    }

    /// Builder: set message type
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Builder: set priority
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the message reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.delivery_status,
            DeliveryStatus::Delivered | DeliveryStatus::Failed
        )
    }

    /// Mark as delivered now
    pub fn mark_delivered(&mut self) {
        self.delivered_at = Some(Utc::now());
        self.delivery_status = DeliveryStatus::Delivered;
    }

    /// Mark as failed
    pub fn mark_failed(&mut self) {
        self.delivery_status = DeliveryStatus::Failed;
    }
}
