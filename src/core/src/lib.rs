//! # Overlink Core
//!
//! Shared types, traits, configuration and error handling for the Overlink
//! overlay protocol. The crypto and network crates both build on these
//! definitions, so nothing in here depends on either of them.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{
    BootstrapNode, HealthPolicy, OverlayConfig, RoutingWeights, SecurityMode,
};
pub use error::{CoreError, Result};
pub use traits::{Bridge, HandshakeTransport};
pub use types::{
    BridgeInfo, BridgeStatus, DeliveryStatus, HandshakeOffer, HandshakeReply, Message,
    MessagePriority, MessageType, Node, NodeId, NodeStatus, PublicKey, SecurityMetadata,
    Signature,
};
