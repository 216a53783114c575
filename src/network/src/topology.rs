//! Point-in-time view of the overlay

use crate::consensus::ConsensusStatus;
use crate::registry::Link;
use chrono::{DateTime, Utc};
use overlink_core::{BridgeInfo, Node, NodeId};
use serde::{Deserialize, Serialize};

/// Derived snapshot. Rebuilt on every request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub local_node_id: NodeId,

    /// Known nodes in registry insertion order
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub bridges: Vec<BridgeInfo>,

    /// Weighted health score in `[0, 1]`
    pub network_health: f64,
    pub consensus: ConsensusStatus,
    pub last_updated: DateTime<Utc>,
}

impl Topology {
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == *node_id)
    }

    pub fn connected_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.connected_nodes().count()
    }
}
