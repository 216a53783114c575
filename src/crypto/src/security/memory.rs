//! In-process handshake transport
//!
//! Routes handshake offers straight to peer [`SecurityManager`]s living in
//! the same process. Used by tests, benches and the demo node.

use super::manager::SecurityManager;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use overlink_core::{
    CoreError, HandshakeOffer, HandshakeReply, HandshakeTransport, NodeId, OverlayConfig,
    Result as CoreResult,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handshake transport over a table of in-process peers
#[derive(Default)]
pub struct InMemoryHandshake {
    peers: DashMap<NodeId, Arc<SecurityManager>>,

    /// Config used to spawn unknown peers on demand
    auto_accept: Option<OverlayConfig>,

    rejected: DashSet<NodeId>,
    delay_ms: AtomicU64,
    exchanges: AtomicU64,
}

impl InMemoryHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: answer offers for unknown nodes by spawning a peer with
    /// `template` (its `local_node_id` is replaced per peer)
    pub fn with_auto_accept(mut self, template: OverlayConfig) -> Self {
        self.auto_accept = Some(template);
        self
    }

    pub fn register_peer(&self, peer: Arc<SecurityManager>) {
        self.peers.insert(peer.local_node_id().clone(), peer);
    }

    pub fn peer(&self, node_id: &NodeId) -> Option<Arc<SecurityManager>> {
        self.peers.get(node_id).map(|p| Arc::clone(&p))
    }

    /// Make `node_id` refuse every handshake
    pub fn reject(&self, node_id: impl Into<NodeId>) {
        self.rejected.insert(node_id.into());
    }

    /// Delay every exchange, to exercise handshake timeouts
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of exchanges carried so far
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    fn resolve(&self, node_id: &NodeId) -> CoreResult<Arc<SecurityManager>> {
        if let Some(peer) = self.peer(node_id) {
            return Ok(peer);
        }
        let template = self
            .auto_accept
            .as_ref()
            .ok_or_else(|| CoreError::not_found(format!("no peer {}", node_id)))?;

        let config = OverlayConfig {
            local_node_id: node_id.to_string(),
            master_key_seed: None,
            ..template.clone()
        };
        let peer = Arc::new(SecurityManager::new(node_id.clone()));
        peer.initialize(&config)
            .map_err(|e| CoreError::crypto(e.to_string()))?;

        debug!(node = %node_id, "Spawned in-memory peer");
        Ok(self
            .peers
            .entry(node_id.clone())
            .or_insert(peer)
            .value()
            .clone())
    }
}

#[async_trait]
impl HandshakeTransport for InMemoryHandshake {
    async fn exchange(&self, _address: &str, offer: HandshakeOffer) -> CoreResult<HandshakeReply> {
        self.exchanges.fetch_add(1, Ordering::Relaxed);

        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.rejected.contains(&offer.responder) {
            return Err(CoreError::handshake_rejected(format!(
                "{} refuses sessions",
                offer.responder
            )));
        }

        let peer = self.resolve(&offer.responder)?;
        peer.accept_handshake(&offer)
            .map_err(|e| CoreError::handshake_rejected(e.to_string()))
    }
}
