//! Node registry
//!
//! Single owner of every known node and of the peer-to-peer link metrics
//! learned from gossip. Each node record sits in its own `DashMap` entry,
//! so updates to different nodes never contend on one lock. Reads hand out
//! clones.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use overlink_core::types::node::MAX_RELIABILITY;
use overlink_core::{Node, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Weight of a new latency sample in the moving average
pub const LATENCY_EWMA_ALPHA: f64 = 0.2;

/// Directed link between two remote nodes, as reported by gossip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    pub latency_ms: f64,
    pub reliability: u8,
}

impl Link {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>, latency_ms: f64, reliability: u8) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            latency_ms: if latency_ms.is_finite() { latency_ms.max(0.0) } else { 0.0 },
            reliability: reliability.min(MAX_RELIABILITY),
        }
    }
}

#[derive(Debug)]
struct Entry {
    /// Insertion order, kept across re-adds
    seq: u64,
    node: Node,
}

#[derive(Debug, Clone)]
struct LinkMetrics {
    latency_ms: f64,
    reliability: u8,
    updated_at: DateTime<Utc>,
}

/// Registry of known nodes
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: DashMap<NodeId, Entry>,
    links: DashMap<(NodeId, NodeId), LinkMetrics>,
    next_seq: AtomicU64,

    /// Bumped on every change that can affect routing
    version: AtomicU64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Monotonic change counter
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Insert or replace a node. Returns `true` if the node was new.
    ///
    /// A replaced node keeps its original insertion position.
    pub fn add_node(&self, node: Node) -> bool {
        let id = node.id.clone();
        let is_new = match self.nodes.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                existing.get_mut().node = node;
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(Entry { seq, node });
                true
            }
        };
        self.bump();
        debug!(node = %id, is_new, "Registered node");
        is_new
    }

    /// Mark a node `Connected` in place, registering it if unknown.
    ///
    /// Metrics and insertion position of a known node are kept. `address`
    /// replaces the recorded one when given; a new node without one gets an
    /// empty address until discovery reports it.
    pub fn mark_connected(&self, node_id: &NodeId, address: Option<&str>) -> Node {
        let node = match self.nodes.entry(node_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                let node = &mut existing.get_mut().node;
                if let Some(address) = address {
                    node.address = address.to_string();
                }
                node.touch();
                node.set_status(NodeStatus::Connected);
                node.clone()
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let node = Node::new(node_id.clone(), address.unwrap_or_default())
                    .with_status(NodeStatus::Connected);
                slot.insert(Entry { seq, node: node.clone() });
                node
            }
        };
        self.bump();
        debug!(node = %node_id, "Marked node connected");
        node
    }

    /// Overwrite a node's metrics. Unknown nodes are ignored.
    pub fn update_metrics(&self, node_id: &NodeId, latency_ms: f64, reliability: u8) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(mut entry) => {
                entry.node.set_metrics(latency_ms, reliability);
                drop(entry);
                self.bump();
                true
            }
            None => {
                warn!(node = %node_id, "Metrics update for unknown node ignored");
                false
            }
        }
    }

    /// Fold a successful hop into the node's metrics: moving-average
    /// latency and one point of reliability, capped at the maximum.
    pub fn record_delivery(&self, node_id: &NodeId, sample_latency_ms: f64) -> Option<Node> {
        let mut entry = match self.nodes.get_mut(node_id) {
            Some(entry) => entry,
            None => {
                warn!(node = %node_id, "Delivery metrics for unknown node ignored");
                return None;
            }
        };

        let node = &mut entry.node;
        let latency = (1.0 - LATENCY_EWMA_ALPHA) * node.latency_ms
            + LATENCY_EWMA_ALPHA * sample_latency_ms;
        let reliability = node.reliability.saturating_add(1);
        node.set_metrics(latency, reliability);
        node.touch();
        let updated = node.clone();
        drop(entry);

        self.bump();
        Some(updated)
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<Node> {
        self.nodes.get(node_id).map(|e| e.node.clone())
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Snapshot of every node in insertion order
    pub fn list_nodes(&self) -> Vec<Node> {
        let mut entries: Vec<(u64, Node)> = self
            .nodes
            .iter()
            .map(|e| (e.seq, e.node.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, node)| node).collect()
    }

    /// Connected nodes in insertion order
    pub fn connected_nodes(&self) -> Vec<Node> {
        self.list_nodes()
            .into_iter()
            .filter(Node::is_connected)
            .collect()
    }

    /// Remove a node together with every link touching it
    pub fn remove_node(&self, node_id: &NodeId) -> Option<Node> {
        let (_, entry) = self.nodes.remove(node_id)?;
        self.links
            .retain(|(from, to), _| from != node_id && to != node_id);
        self.bump();
        debug!(node = %node_id, "Removed node");
        Some(entry.node)
    }

    pub fn set_status(&self, node_id: &NodeId, status: NodeStatus) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(mut entry) => {
                entry.node.set_status(status);
                drop(entry);
                self.bump();
                true
            }
            None => false,
        }
    }

    /// Refresh a node's `last_seen`
    pub fn touch(&self, node_id: &NodeId) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(mut entry) => {
                entry.node.touch();
                true
            }
            None => false,
        }
    }

    /// Record or refresh a gossip link. Self-links are ignored.
    pub fn add_link(&self, link: Link) {
        if link.from == link.to {
            return;
        }
        self.links.insert(
            (link.from, link.to),
            LinkMetrics {
                latency_ms: link.latency_ms,
                reliability: link.reliability,
                updated_at: Utc::now(),
            },
        );
        self.bump();
    }

    /// All known links, ordered by endpoint ids
    pub fn links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self
            .links
            .iter()
            .map(|e| {
                let (from, to) = e.key();
                Link {
                    from: from.clone(),
                    to: to.clone(),
                    latency_ms: e.latency_ms,
                    reliability: e.reliability,
                }
            })
            .collect();
        links.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        links
    }

    /// Remove `Discovered` nodes not seen within `max_age`, and links not
    /// refreshed within it. Returns the removed node ids.
    pub fn expire_stale(&self, max_age: chrono::Duration) -> Vec<NodeId> {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Vec::new();
        };
        let stale: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|e| e.node.status == NodeStatus::Discovered && e.node.last_seen < cutoff)
            .map(|e| e.key().clone())
            .collect();

        for node_id in &stale {
            self.remove_node(node_id);
        }

        let before = self.links.len();
        self.links.retain(|_, metrics| metrics.updated_at >= cutoff);
        if self.links.len() != before {
            self.bump();
        }
        stale
    }

    pub fn clear(&self) {
        self.nodes.clear();
        self.links.clear();
        self.bump();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.nodes.iter().filter(|e| e.node.is_connected()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn node(id: &str) -> Node {
        Node::new(id, format!("mem://{}", id))
    }

    #[test]
    fn test_list_nodes_keeps_insertion_order() {
        let registry = NodeRegistry::new();
        for id in ["c", "a", "b"] {
            assert!(registry.add_node(node(id)));
        }
        // re-adding keeps the original position
        assert!(!registry.add_node(node("c").with_status(NodeStatus::Connected)));

        let ids: Vec<String> = registry.list_nodes().into_iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(registry.get_node(&"c".into()).unwrap().is_connected());
    }

    #[test]
    fn test_update_metrics_unknown_is_noop() {
        let registry = NodeRegistry::new();
        let version = registry.version();
        assert!(!registry.update_metrics(&"ghost".into(), 10.0, 90));
        assert_eq!(registry.version(), version);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_metrics_clamps() {
        let registry = NodeRegistry::new();
        registry.add_node(node("a"));
        assert!(registry.update_metrics(&"a".into(), -5.0, 250));
        let a = registry.get_node(&"a".into()).unwrap();
        assert_eq!(a.latency_ms, 0.0);
        assert_eq!(a.reliability, 100);
    }

    #[test]
    fn test_record_delivery_moving_average() {
        let registry = NodeRegistry::new();
        registry.add_node(node("a").with_metrics(100.0, 50));

        let a = registry.record_delivery(&"a".into(), 50.0).unwrap();
        assert!((a.latency_ms - 90.0).abs() < 1e-9);
        assert_eq!(a.reliability, 51);

        registry.update_metrics(&"a".into(), 10.0, 100);
        let a = registry.record_delivery(&"a".into(), 10.0).unwrap();
        assert_eq!(a.reliability, 100);

        assert!(registry.record_delivery(&"ghost".into(), 1.0).is_none());
    }

    #[test]
    fn test_remove_node_drops_links() {
        let registry = NodeRegistry::new();
        registry.add_node(node("a"));
        registry.add_node(node("b"));
        registry.add_link(Link::new("a", "b", 5.0, 99));
        registry.add_link(Link::new("b", "a", 5.0, 99));
        registry.add_link(Link::new("a", "a", 1.0, 100));
        assert_eq!(registry.links().len(), 2);

        assert!(registry.remove_node(&"b".into()).is_some());
        assert!(registry.links().is_empty());
        assert!(registry.remove_node(&"b".into()).is_none());
    }

    #[test]
    fn test_set_status_stamps_connection() {
        let registry = NodeRegistry::new();
        registry.add_node(node("a"));
        assert!(registry.set_status(&"a".into(), NodeStatus::Connected));
        assert!(registry.get_node(&"a".into()).unwrap().connected_at.is_some());
        assert_eq!(registry.connected_count(), 1);
        assert!(!registry.set_status(&"zz".into(), NodeStatus::Connected));
    }

    #[test]
    fn test_mark_connected_updates_in_place() {
        let registry = NodeRegistry::new();
        registry.add_node(node("first"));
        registry.add_node(node("a").with_metrics(100.0, 50));
        registry.record_delivery(&"a".into(), 50.0);

        let a = registry.mark_connected(&"a".into(), Some("mem://a-2"));
        assert!(a.is_connected());
        assert_eq!(a.address, "mem://a-2");
        assert!((a.latency_ms - 90.0).abs() < 1e-9);
        assert_eq!(a.reliability, 51);

        // address is kept when the caller does not know it
        let a = registry.mark_connected(&"a".into(), None);
        assert_eq!(a.address, "mem://a-2");

        let fresh = registry.mark_connected(&"b".into(), None);
        assert!(fresh.is_connected());
        assert_eq!(fresh.address, "");

        let order: Vec<String> = registry.list_nodes().iter().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["first", "a", "b"]);
        assert_eq!(registry.connected_count(), 2);
    }

    #[test]
    fn test_expire_stale_with_unbounded_age() {
        let registry = NodeRegistry::new();
        registry.add_node(node("old"));
        assert!(registry.expire_stale(chrono::Duration::MAX).is_empty());
        assert!(registry.contains(&"old".into()));
    }

    #[test]
    fn test_expire_stale_only_removes_discovered() {
        let registry = NodeRegistry::new();
        registry.add_node(node("old"));
        registry.add_node(node("conn").with_status(NodeStatus::Connected));

        let removed = registry.expire_stale(chrono::Duration::seconds(-1));
        assert_eq!(removed, vec![NodeId::from("old")]);
        assert!(registry.contains(&"conn".into()));

        assert!(registry.expire_stale(chrono::Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_version_moves_on_change() {
        let registry = NodeRegistry::new();
        let v0 = registry.version();
        registry.add_node(node("a"));
        let v1 = registry.version();
        assert!(v1 > v0);
        registry.touch(&"a".into());
        assert_eq!(registry.version(), v1);
        registry.clear();
        assert!(registry.version() > v1);
    }

    #[test]
    fn test_concurrent_updates_to_different_nodes() {
        let registry = Arc::new(NodeRegistry::new());
        for i in 0..16 {
            registry.add_node(node(&format!("n{}", i)).with_metrics(0.0, 0));
        }

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let id = NodeId::from(format!("n{}", i));
                    for _ in 0..50 {
                        registry.record_delivery(&id, 10.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for node in registry.list_nodes() {
            assert_eq!(node.reliability, 50);
        }
    }
}
