//! Node discovery
//!
//! Discovery polls a set of [`DiscoverySource`]s and merges what they report
//! into the registry. Entries are deduplicated by node id, so repeated or
//! concurrent runs never create duplicates. A source that fails is logged
//! and skipped; the rest of the run continues.

use crate::registry::{Link, NodeRegistry};
use async_trait::async_trait;
use overlink_core::{BootstrapNode, Node, NodeId, Result as CoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A node as reported by a discovery source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    pub id: NodeId,
    pub address: String,
    pub capabilities: Vec<String>,

    /// Metrics advertised by the source, if it measured any
    pub latency_ms: Option<f64>,
    pub reliability: Option<u8>,

    /// Links from this node to its own peers
    pub links: Vec<Link>,
}

impl DiscoveredNode {
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capabilities: Vec::new(),
            latency_ms: None,
            reliability: None,
            links: Vec::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metrics(mut self, latency_ms: f64, reliability: u8) -> Self {
        self.latency_ms = Some(latency_ms);
        self.reliability = Some(reliability);
        self
    }

    /// Builder: advertise a link from this node to `peer`
    pub fn with_link(mut self, peer: impl Into<NodeId>, latency_ms: f64, reliability: u8) -> Self {
        let link = Link::new(self.id.clone(), peer, latency_ms, reliability);
        self.links.push(link);
        self
    }

    fn to_node(&self) -> Node {
        let mut node = Node::new(self.id.clone(), self.address.clone())
            .with_capabilities(self.capabilities.iter().cloned());
        if let (Some(latency), Some(reliability)) = (self.latency_ms, self.reliability) {
            node = node.with_metrics(latency, reliability);
        }
        node
    }
}

/// A mechanism that can list reachable nodes
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self) -> CoreResult<Vec<DiscoveredNode>>;
}

/// Static entry points from configuration
#[derive(Debug, Clone)]
pub struct BootstrapSource {
    nodes: Vec<BootstrapNode>,
}

impl BootstrapSource {
    pub fn new(nodes: Vec<BootstrapNode>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl DiscoverySource for BootstrapSource {
    fn name(&self) -> &str {
        "bootstrap"
    }

    async fn discover(&self) -> CoreResult<Vec<DiscoveredNode>> {
        Ok(self
            .nodes
            .iter()
            .map(|b| {
                DiscoveredNode::new(b.id.as_str(), b.address.clone())
                    .with_capabilities(b.capabilities.iter().cloned())
            })
            .collect())
    }
}

/// Peer gossip table: advertisements pushed by peers, read on each run
#[derive(Debug, Default)]
pub struct GossipTable {
    entries: RwLock<Vec<DiscoveredNode>>,
}

impl GossipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a peer advertisement
    pub fn advertise(&self, node: DiscoveredNode) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.id == node.id) {
            Some(existing) => *existing = node,
            None => entries.push(node),
        }
    }

    pub fn withdraw(&self, node_id: &NodeId) {
        self.entries.write().retain(|e| e.id != *node_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl DiscoverySource for GossipTable {
    fn name(&self) -> &str {
        "gossip"
    }

    async fn discover(&self) -> CoreResult<Vec<DiscoveredNode>> {
        Ok(self.entries.read().clone())
    }
}

/// Populates the registry from discovery sources
pub struct Discovery {
    local_id: NodeId,
    registry: Arc<NodeRegistry>,
    sources: RwLock<Vec<Arc<dyn DiscoverySource>>>,
    node_expiry: chrono::Duration,
}

impl Discovery {
    pub fn new(local_id: NodeId, registry: Arc<NodeRegistry>, node_expiry: chrono::Duration) -> Self {
        Self {
            local_id,
            registry,
            sources: RwLock::new(Vec::new()),
            node_expiry,
        }
    }

    pub fn add_source(&self, source: Arc<dyn DiscoverySource>) {
        info!(source = source.name(), "Added discovery source");
        self.sources.write().push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }

    /// Query every source once and register new nodes as `Discovered`.
    ///
    /// Returns only the nodes that were not known before; known nodes are
    /// refreshed in place.
    pub async fn discover_nodes(&self) -> Vec<Node> {
        let sources: Vec<_> = self.sources.read().clone();
        let mut found = Vec::new();

        for source in sources {
            let entries = match source.discover().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Discovery source failed");
                    continue;
                }
            };
            debug!(source = source.name(), count = entries.len(), "Discovery source answered");

            for entry in entries {
                if entry.id == self.local_id {
                    continue;
                }
                for link in &entry.links {
                    self.registry.add_link(link.clone());
                }

                if self.registry.touch(&entry.id) {
                    continue;
                }
                let node = entry.to_node();
                if self.registry.add_node(node.clone()) {
                    found.push(node);
                }
            }
        }

        if !found.is_empty() {
            info!(count = found.len(), "Discovered new nodes");
        }
        found
    }

    /// Drop discovered-but-never-connected nodes that went quiet
    pub fn expire_stale(&self) -> Vec<NodeId> {
        let removed = self.registry.expire_stale(self.node_expiry);
        if !removed.is_empty() {
            info!(count = removed.len(), "Expired stale nodes");
        }
        removed
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("local_id", &self.local_id)
            .field("sources", &self.source_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlink_core::{CoreError, NodeStatus};

    struct FailingSource;

    #[async_trait]
    impl DiscoverySource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn discover(&self) -> CoreResult<Vec<DiscoveredNode>> {
            Err(CoreError::network("unreachable"))
        }
    }

    fn discovery() -> (Arc<NodeRegistry>, Discovery) {
        let registry = Arc::new(NodeRegistry::new());
        let discovery = Discovery::new("local".into(), registry.clone(), chrono::Duration::minutes(10));
        (registry, discovery)
    }

    #[tokio::test]
    async fn test_bootstrap_nodes_registered_once() {
        let (registry, discovery) = discovery();
        discovery.add_source(Arc::new(BootstrapSource::new(vec![BootstrapNode {
            id: "seed".into(),
            address: "10.0.0.1:7000".into(),
            capabilities: vec!["ledger".into()],
        }])));

        let first = discovery.discover_nodes().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, NodeStatus::Discovered);
        assert!(first[0].has_capability("ledger"));

        assert!(discovery.discover_nodes().await.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_gossip_records_links_and_skips_local() {
        let (registry, discovery) = discovery();
        let gossip = Arc::new(GossipTable::new());
        gossip.advertise(DiscoveredNode::new("a", "mem://a").with_metrics(12.0, 97).with_link("b", 5.0, 99));
        gossip.advertise(DiscoveredNode::new("local", "mem://local"));
        discovery.add_source(gossip.clone());

        let found = discovery.discover_nodes().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].latency_ms, 12.0);
        assert_eq!(registry.links().len(), 1);
        assert!(!registry.contains(&"local".into()));
    }

    #[tokio::test]
    async fn test_failing_source_is_skipped() {
        let (registry, discovery) = discovery();
        let gossip = Arc::new(GossipTable::new());
        gossip.advertise(DiscoveredNode::new("a", "mem://a"));
        discovery.add_source(Arc::new(FailingSource));
        discovery.add_source(gossip);

        assert_eq!(discovery.discover_nodes().await.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_known_connected_node_is_not_downgraded() {
        let (registry, discovery) = discovery();
        registry.add_node(Node::new("a", "mem://a").with_status(NodeStatus::Connected));
        let gossip = Arc::new(GossipTable::new());
        gossip.advertise(DiscoveredNode::new("a", "mem://a"));
        discovery.add_source(gossip);

        assert!(discovery.discover_nodes().await.is_empty());
        assert!(registry.get_node(&"a".into()).unwrap().is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_do_not_duplicate() {
        let (registry, discovery) = discovery();
        let gossip = Arc::new(GossipTable::new());
        for i in 0..20 {
            gossip.advertise(DiscoveredNode::new(format!("n{}", i), "mem://n"));
        }
        discovery.add_source(gossip);
        let discovery = Arc::new(discovery);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let discovery = discovery.clone();
                tokio::spawn(async move { discovery.discover_nodes().await.len() })
            })
            .collect();
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        assert_eq!(total, 20);
        assert_eq!(registry.len(), 20);
    }

    #[test]
    fn test_gossip_advertise_replaces() {
        let gossip = GossipTable::new();
        gossip.advertise(DiscoveredNode::new("a", "mem://1"));
        gossip.advertise(DiscoveredNode::new("a", "mem://2"));
        assert_eq!(gossip.len(), 1);
        gossip.withdraw(&"a".into());
        assert!(gossip.is_empty());
    }

    #[test]
    fn test_expire_stale() {
        let registry = Arc::new(NodeRegistry::new());
        let discovery = Discovery::new("local".into(), registry.clone(), chrono::Duration::seconds(-1));
        registry.add_node(Node::new("quiet", "mem://q"));
        assert_eq!(discovery.expire_stale(), vec![NodeId::from("quiet")]);
    }
}
