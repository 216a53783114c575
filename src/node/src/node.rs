//! Demo overlay node wiring all subsystems in one process

use anyhow::{Context, Result};
use overlink_core::{MessagePriority, MessageType, NodeId};
use overlink_crypto::InMemoryHandshake;
use overlink_network::{
    ClientFeatures, DiscoveredNode, GossipTable, OverlayClient, ProtocolCoordinator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;

/// A coordinator plus the in-memory peers it talks to
pub struct OverlayNode {
    config: NodeConfig,
    coordinator: Arc<ProtocolCoordinator>,
    client: OverlayClient,
    gossip: Arc<GossipTable>,
}

impl OverlayNode {
    /// Wire the overlay. Nothing runs until [`OverlayNode::run`].
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        // unknown responders are spawned with the node's own cipher settings
        let transport = Arc::new(InMemoryHandshake::new().with_auto_accept(config.overlay.clone()));
        let gossip = Arc::new(GossipTable::new());

        let coordinator = Arc::new(
            ProtocolCoordinator::builder(config.overlay.clone())
                .handshake_transport(transport)
                .discovery_source(gossip.clone())
                .build(),
        );
        let client = OverlayClient::with_features(
            coordinator.clone(),
            ClientFeatures {
                auto_connect: true,
                discover_on_miss: true,
                bridges_enabled: true,
            },
        );

        Ok(Self {
            config,
            coordinator,
            client,
            gossip,
        })
    }

    pub fn coordinator(&self) -> &Arc<ProtocolCoordinator> {
        &self.coordinator
    }

    /// Advertise the configured peers, start the network and keep sending
    /// demo traffic until the future is dropped or a send loop error occurs
    pub async fn run(&self) -> Result<()> {
        self.advertise_peers();
        self.coordinator
            .start_network()
            .await
            .context("Failed to start overlay network")?;
        info!(
            node = %self.coordinator.local_node_id(),
            peers = self.config.demo.peers.len(),
            "Overlay node running"
        );

        let peers: Vec<NodeId> = self
            .config
            .demo
            .peers
            .iter()
            .map(|p| NodeId::from(p.id.as_str()))
            .collect();
        let mut report = interval(Duration::from_secs(self.config.node.report_interval_secs.max(1)));
        let send_every = self.config.demo.message_interval_ms;
        let mut send = interval(Duration::from_millis(send_every.max(1)));
        let mut sent: usize = 0;

        loop {
            tokio::select! {
                _ = report.tick() => self.log_topology(),
                _ = send.tick(), if send_every > 0 && !peers.is_empty() => {
                    let target = &peers[sent % peers.len()];
                    sent += 1;
                    self.send_demo_message(target, sent).await;
                }
            }
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.coordinator
            .stop_network()
            .await
            .context("Failed to stop overlay network")?;
        Ok(())
    }

    fn advertise_peers(&self) {
        for peer in &self.config.demo.peers {
            let mut entry = DiscoveredNode::new(peer.id.as_str(), format!("mem://{}", peer.id))
                .with_capabilities(peer.capabilities.iter().cloned())
                .with_metrics(peer.latency_ms, peer.reliability);
            for link in &peer.links {
                let far = self.config.demo.peers.iter().find(|p| p.id == *link);
                let (latency, reliability) =
                    far.map_or((peer.latency_ms, peer.reliability), |p| (p.latency_ms, p.reliability));
                entry = entry.with_link(link.as_str(), latency, reliability);
            }
            self.gossip.advertise(entry);
        }
        debug!(count = self.gossip.len(), "Advertised demo peers");
    }

    async fn send_demo_message(&self, target: &NodeId, sequence: usize) {
        let local = self.coordinator.local_node_id().clone();
        let content = format!("demo message {} from {}", sequence, local).into_bytes();
        let result = self
            .client
            .send_message(local, target.clone(), content, MessageType::Data, MessagePriority::Normal)
            .await;

        match result.error {
            None => info!(
                target = %target,
                hops = result.message.routing_path.len(),
                "Demo message delivered"
            ),
            Some(e) => warn!(
                target = %target,
                status = %result.message.delivery_status,
                error = %e,
                "Demo message not delivered"
            ),
        }
    }

    fn log_topology(&self) {
        let topology = self.coordinator.get_topology();
        info!(
            nodes = topology.nodes.len(),
            connected = topology.connected_count(),
            links = topology.links.len(),
            health = topology.network_health,
            consensus = ?topology.consensus.state,
            "Topology"
        );
    }
}
