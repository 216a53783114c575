//! Shared types for the Overlink protocol

pub mod bridge;
pub mod crypto;
pub mod handshake;
pub mod message;
pub mod node;

// Re-export commonly used types
pub use bridge::{BridgeInfo, BridgeStatus};
pub use crypto::{PublicKey, Signature};
pub use handshake::{HandshakeOffer, HandshakeReply};
pub use message::{DeliveryStatus, Message, MessagePriority, MessageType, SecurityMetadata};
pub use node::{Node, NodeId, NodeStatus};
