//! Protocol coordinator
//!
//! Top-level facade over the security manager, registry, router, discovery,
//! consensus tracker and bridge table. Construction only wires components;
//! nothing runs until [`ProtocolCoordinator::start_network`].
//!
//! Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`.

use crate::bridge::BridgeRegistry;
use crate::consensus::{ConsensusReport, ConsensusTracker};
use crate::discovery::{BootstrapSource, Discovery, DiscoverySource};
use crate::error::{NetworkError, Result, Stage, StageExt};
use crate::health::network_health;
use crate::registry::NodeRegistry;
use crate::router::Router;
use crate::topology::Topology;
use chrono::Utc;
use overlink_core::{
    Bridge, HandshakeTransport, Message, Node, NodeId, NodeStatus, OverlayConfig,
};
use overlink_crypto::{SecurityManager, SecurityStats};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Network lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkState::Stopped => "stopped",
            NetworkState::Starting => "starting",
            NetworkState::Running => "running",
            NetworkState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Components shared with the background ticks
struct Inner {
    config: OverlayConfig,
    local_id: NodeId,
    state: RwLock<NetworkState>,
    security: Arc<SecurityManager>,
    registry: Arc<NodeRegistry>,
    router: Router,
    discovery: Discovery,
    consensus: ConsensusTracker,
    bridges: BridgeRegistry,
}

struct Ticks {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Builder for [`ProtocolCoordinator`]
pub struct CoordinatorBuilder {
    config: OverlayConfig,
    transport: Option<Arc<dyn HandshakeTransport>>,
    sources: Vec<Arc<dyn DiscoverySource>>,
    bridges: Vec<Arc<dyn Bridge>>,
}

impl CoordinatorBuilder {
    /// Transport used to reach peers during session handshakes
    pub fn handshake_transport(mut self, transport: Arc<dyn HandshakeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn discovery_source(mut self, source: Arc<dyn DiscoverySource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn bridge(mut self, bridge: Arc<dyn Bridge>) -> Self {
        self.bridges.push(bridge);
        self
    }

    pub fn build(self) -> ProtocolCoordinator {
        let config = self.config;
        let local_id = NodeId::from(config.local_node_id.as_str());

        let registry = Arc::new(NodeRegistry::new());

        // Peers that opened a session with us become routable targets
        let accepted = registry.clone();
        let mut security = SecurityManager::new(local_id.clone()).on_session_accepted(Arc::new(
            move |node_id: &NodeId| {
                accepted.mark_connected(node_id, None);
                info!(node = %node_id, "Connected by remote node");
            },
        ));
        if let Some(transport) = self.transport {
            security = security.with_transport(transport);
        }

        let discovery = Discovery::new(local_id.clone(), registry.clone(), config.node_expiry());
        if !config.bootstrap_nodes.is_empty() {
            discovery.add_source(Arc::new(BootstrapSource::new(config.bootstrap_nodes.clone())));
        }
        for source in self.sources {
            discovery.add_source(source);
        }

        let bridges = BridgeRegistry::new();
        for bridge in self.bridges {
            bridges.register(bridge);
        }

        let inner = Inner {
            router: Router::new(&config, registry.clone()),
            consensus: ConsensusTracker::new(registry.clone(), config.consensus_quorum),
            security: Arc::new(security),
            state: RwLock::new(NetworkState::Stopped),
            local_id,
            registry,
            discovery,
            bridges,
            config,
        };

        ProtocolCoordinator {
            inner: Arc::new(inner),
            ticks: Mutex::new(None),
        }
    }
}

/// Owned entry point to the overlay. Share it behind an `Arc`.
pub struct ProtocolCoordinator {
    inner: Arc<Inner>,
    ticks: Mutex<Option<Ticks>>,
}

impl ProtocolCoordinator {
    pub fn builder(config: OverlayConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            transport: None,
            sources: Vec::new(),
            bridges: Vec::new(),
        }
    }

    pub fn state(&self) -> NetworkState {
        *self.inner.state.read()
    }

    pub fn local_node_id(&self) -> &NodeId {
        &self.inner.local_id
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    /// Shared handle to the security manager, e.g. to register it with an
    /// in-memory handshake transport
    pub fn security(&self) -> Arc<SecurityManager> {
        self.inner.security.clone()
    }

    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.inner.registry.clone()
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn security_stats(&self) -> Result<SecurityStats> {
        Ok(self.inner.security.stats()?)
    }

    /// Initialize security, run discovery once and arm the periodic ticks.
    ///
    /// Any failure tears everything down again and leaves the network
    /// `Stopped`.
    pub async fn start_network(&self) -> Result<()> {
        self.inner
            .transition(NetworkState::Stopped, NetworkState::Starting, "start network")?;
        info!(node = %self.inner.local_id, "Starting overlay network");

        match self.inner.start_components().await {
            Ok(()) => {
                self.arm_ticks();
                *self.inner.state.write() = NetworkState::Running;
                info!(
                    node = %self.inner.local_id,
                    nodes = self.inner.registry.len(),
                    "Overlay network running"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Overlay startup failed, tearing down");
                self.inner.teardown();
                *self.inner.state.write() = NetworkState::Stopped;
                Err(e.at(Stage::Startup))
            }
        }
    }

    /// Halt the ticks, drop all nodes and sessions, and return to `Stopped`
    pub async fn stop_network(&self) -> Result<()> {
        self.inner
            .transition(NetworkState::Running, NetworkState::Stopping, "stop network")?;
        info!(node = %self.inner.local_id, "Stopping overlay network");

        let ticks = self.ticks.lock().take();
        if let Some(ticks) = ticks {
            ticks.token.cancel();
            for handle in ticks.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background tick ended abnormally");
                }
            }
        }

        self.inner.teardown();
        *self.inner.state.write() = NetworkState::Stopped;
        info!(node = %self.inner.local_id, "Overlay network stopped");
        Ok(())
    }

    fn arm_ticks(&self) {
        let token = CancellationToken::new();
        let handles = vec![
            tokio::spawn(Inner::discovery_tick(self.inner.clone(), token.child_token())),
            tokio::spawn(Inner::expiry_tick(self.inner.clone(), token.child_token())),
        ];
        *self.ticks.lock() = Some(Ticks { token, handles });
    }

    /// Open a session with a node and register it as `Connected`
    pub async fn connect_to_node(&self, node_id: &NodeId, address: &str) -> Result<Node> {
        self.inner.ensure_running("connect to node")?;
        self.inner.connect(node_id, address).await
    }

    /// Close the node's session and forget the node
    pub async fn disconnect_node(&self, node_id: &NodeId) -> Result<bool> {
        self.inner.ensure_running("disconnect node")?;
        self.inner.security.close_session(node_id);
        self.inner.consensus.forget(node_id);
        let removed = self.inner.registry.remove_node(node_id).is_some();
        if removed {
            self.inner.router.remove_node(node_id);
            info!(node = %node_id, "Disconnected node");
        }
        Ok(removed)
    }

    /// Encrypt, route and forward a message hop by hop.
    ///
    /// The caller keeps ownership of the message and sees its final state:
    /// still `Pending` if it could not be sealed, `Failed` if routing or
    /// forwarding broke, `Delivered` on success. Nothing is retried.
    pub async fn send_message(&self, message: &mut Message) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_running("send message")?;

        *message = inner.security.encrypt(message.clone()).stage(Stage::Encrypt)?;

        let route = match inner.router.find_route(&message.target, message.priority) {
            Ok(route) => route,
            Err(e) => {
                message.mark_failed();
                return Err(e.at(Stage::Route));
            }
        };
        debug!(message = %message.id, route = ?route, "Forwarding message");

        for hop in route {
            if let Err(e) = inner.ensure_running("forward message") {
                message.mark_failed();
                return Err(e.at(Stage::Forward));
            }
            if let Err(e) = inner.forward_hop(&message.id, &hop).await {
                message.mark_failed();
                return Err(e.at(Stage::Forward));
            }
            message.routing_path.push(hop);
        }

        message.mark_delivered();
        debug!(
            message = %message.id,
            hops = message.routing_path.len(),
            "Message delivered"
        );
        Ok(())
    }

    /// Verify and decrypt a message that arrived for this node
    pub async fn receive_message(&self, message: Message) -> Result<Message> {
        self.inner.ensure_running("receive message")?;
        let mut message = self.inner.security.decrypt(message).stage(Stage::Decrypt)?;
        self.inner.registry.touch(&message.source);
        if !message.is_terminal() {
            message.mark_delivered();
        }
        Ok(message)
    }

    /// Run discovery now instead of waiting for the next tick
    pub async fn discover_and_register_nodes(&self) -> Result<Vec<Node>> {
        self.inner.ensure_running("discover nodes")?;
        let found = self.inner.discovery.discover_nodes().await;
        for node in &found {
            self.inner.router.add_node(&node.id);
        }
        Ok(found)
    }

    /// Record a peer's consensus report. Returns whether it was accepted.
    pub fn report_consensus(&self, node_id: &NodeId, report: ConsensusReport) -> Result<bool> {
        self.inner.ensure_running("report consensus")?;
        Ok(self.inner.consensus.report(node_id, report))
    }

    pub fn get_topology(&self) -> Topology {
        let inner = &self.inner;
        let nodes = inner.registry.list_nodes();
        Topology {
            local_node_id: inner.local_id.clone(),
            network_health: network_health(&inner.config.health, &nodes),
            nodes,
            links: inner.registry.links(),
            bridges: inner.bridges.list(),
            consensus: inner.consensus.status(),
            last_updated: Utc::now(),
        }
    }

    pub fn register_bridge(&self, bridge: Arc<dyn Bridge>) {
        self.inner.bridges.register(bridge);
    }

    /// Forward a request to the first bridge advertising `capability`
    pub async fn call_through_bridge(&self, capability: &str, request: Vec<u8>) -> Result<Vec<u8>> {
        let bridge = self
            .inner
            .bridges
            .find(capability)
            .ok_or_else(|| NetworkError::BridgeNotFound(capability.to_string()).at(Stage::Bridge))?;
        let id = bridge.info().id;
        debug!(bridge = %id, capability, "Calling through bridge");

        bridge.invoke(request).await.map_err(|e| {
            NetworkError::BridgeFailed {
                bridge: id,
                reason: e.to_string(),
            }
            .at(Stage::Bridge)
        })
    }
}

impl Drop for ProtocolCoordinator {
    fn drop(&mut self) {
        if let Some(ticks) = self.ticks.get_mut().take() {
            ticks.token.cancel();
        }
    }
}

impl fmt::Debug for ProtocolCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolCoordinator")
            .field("local_id", &self.inner.local_id)
            .field("state", &self.state())
            .field("nodes", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn transition(&self, from: NetworkState, to: NetworkState, operation: &str) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(NetworkError::invalid_state(operation, *state));
        }
        *state = to;
        Ok(())
    }

    fn ensure_running(&self, operation: &str) -> Result<()> {
        let state = *self.state.read();
        if state != NetworkState::Running {
            return Err(NetworkError::invalid_state(operation, state));
        }
        Ok(())
    }

    async fn start_components(&self) -> Result<()> {
        self.security.initialize(&self.config).stage(Stage::Startup)?;
        let found = self.discovery.discover_nodes().await;
        for node in &found {
            self.router.add_node(&node.id);
        }
        self.auto_connect().await;
        Ok(())
    }

    fn teardown(&self) {
        self.registry.clear();
        self.router.invalidate();
        self.consensus.clear();
        self.security.shutdown();
    }

    async fn connect(&self, node_id: &NodeId, address: &str) -> Result<Node> {
        let session = self
            .security
            .establish_session(node_id, address)
            .await
            .stage(Stage::Handshake)?;

        let node = self.registry.mark_connected(node_id, Some(address));
        self.router.add_node(node_id);
        info!(node = %node_id, session = %session.session_id, "Connected to node");
        Ok(node)
    }

    /// Simulate transmission to one hop and fold the result into its metrics
    async fn forward_hop(&self, message_id: &str, hop: &NodeId) -> Result<()> {
        let delivery_failed = |reason: &str| NetworkError::DeliveryFailed {
            message_id: message_id.to_string(),
            hop: hop.to_string(),
            reason: reason.to_string(),
        };

        let node = self
            .registry
            .get_node(hop)
            .ok_or_else(|| delivery_failed("node is no longer registered"))?;

        let scale = self.config.latency_time_scale;
        let delay_ms = node.latency_ms * scale;
        let started = Instant::now();
        if delay_ms > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay_ms / 1000.0)).await;
        }
        let sample_ms = if scale > 0.0 {
            started.elapsed().as_secs_f64() * 1000.0 / scale
        } else {
            node.latency_ms
        };

        self.registry
            .record_delivery(hop, sample_ms)
            .ok_or_else(|| delivery_failed("node left during transmission"))?;
        debug!(message = %message_id, hop = %hop, sample_ms, "Hop forwarded");
        Ok(())
    }

    /// Connect to discovered nodes up to `max_connections`
    async fn auto_connect(&self) {
        if !self.config.auto_connect {
            return;
        }
        let mut budget = self
            .config
            .max_connections
            .saturating_sub(self.registry.connected_count());

        for node in self.registry.list_nodes() {
            if budget == 0 {
                break;
            }
            if node.status != NodeStatus::Discovered {
                continue;
            }
            match self.connect(&node.id, &node.address).await {
                Ok(_) => budget -= 1,
                Err(e) => warn!(node = %node.id, error = %e, "Auto-connect failed"),
            }
        }
    }

    async fn discovery_tick(inner: Arc<Inner>, token: CancellationToken) {
        let period = inner.config.discovery_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let found = inner.discovery.discover_nodes().await;
                    for node in &found {
                        inner.router.add_node(&node.id);
                    }
                    for node_id in inner.discovery.expire_stale() {
                        inner.consensus.forget(&node_id);
                        inner.router.remove_node(&node_id);
                    }
                    inner.auto_connect().await;
                }
            }
        }
        debug!("Discovery tick stopped");
    }

    async fn expiry_tick(inner: Arc<Inner>, token: CancellationToken) {
        let period = inner.config.session_expiry_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => inner.expire_sessions(),
            }
        }
        debug!("Session expiry tick stopped");
    }

    /// Expire sessions and mark nodes left without one as disconnected
    fn expire_sessions(&self) {
        match self.security.rotate_or_expire_sessions() {
            Ok(report) if report.expired > 0 => {
                for node in self.registry.connected_nodes() {
                    if !self.security.has_active_session(&node.id) {
                        self.registry.set_status(&node.id, NodeStatus::Disconnected);
                        info!(node = %node.id, "Session expired, node disconnected");
                    }
                }
                self.router.invalidate();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Session expiry scan failed"),
        }
    }
}
