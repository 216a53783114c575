//! Overlay node types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Highest reliability score a node can carry
pub const MAX_RELIABILITY: u8 = 100;

/// Unique identifier for an overlay node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new node ID
    pub fn new<S: Into<String>>(id: S) -> Self {
        NodeId(id.into())
    }

    /// Get the node ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Lifecycle status of a node as seen from the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Discovered => "discovered",
            NodeStatus::Connecting => "connecting",
            NodeStatus::Connected => "connected",
            NodeStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// A participant reachable through the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier
    pub id: NodeId,

    /// Underlay address (opaque to the core)
    pub address: String,

    /// Advertised capability tags
    pub capabilities: BTreeSet<String>,

    /// Current status
    pub status: NodeStatus,

    /// Latest latency estimate in milliseconds
    pub latency_ms: f64,

    /// Reliability score (0-100)
    pub reliability: u8,

    /// When the node reached `Connected`
    pub connected_at: Option<DateTime<Utc>>,

    /// Last time the node was announced or used
    pub last_seen: DateTime<Utc>,
}

impl Node {
    /// Create a freshly discovered node with neutral metrics
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capabilities: BTreeSet::new(),
            status: NodeStatus::Discovered,
            latency_ms: 0.0,
            reliability: MAX_RELIABILITY,
            connected_at: None,
            last_seen: Utc::now(),
        }
    }

    /// Builder: set capabilities
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set latency and reliability
    pub fn with_metrics(mut self, latency_ms: f64, reliability: u8) -> Self {
        self.set_metrics(latency_ms, reliability);
        self
    }

    /// Builder: set status
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.set_status(status);
        self
    }

    /// Update latency and reliability, clamping to valid ranges
    pub fn set_metrics(&mut self, latency_ms: f64, reliability: u8) {
        self.latency_ms = if latency_ms.is_finite() { latency_ms.max(0.0) } else { 0.0 };
        self.reliability = reliability.min(MAX_RELIABILITY);
    }

    /// Change status, stamping `connected_at` on first connection
    pub fn set_status(&mut self, status: NodeStatus) {
        if status == NodeStatus::Connected && self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
        if status != NodeStatus::Connected {
            self.connected_at = None;
        }
        self.status = status;
    }

    /// Update last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Whether the node is directly connected
    pub fn is_connected(&self) -> bool {
        self.status == NodeStatus::Connected
    }

    /// Whether the node advertises a capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
