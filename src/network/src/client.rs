//! Upper-layer client
//!
//! The one surface business-level consumers use. Optional behaviour is
//! switched on through [`ClientFeatures`] rather than separate client types.

use crate::coordinator::ProtocolCoordinator;
use crate::error::{NetworkError, Result, Stage};
use crate::topology::Topology;
use overlink_core::{Message, MessagePriority, MessageType, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Capability flags for [`OverlayClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientFeatures {
    /// Open a session on demand when the target is known but has none
    pub auto_connect: bool,

    /// Run one discovery pass when the target is not in the registry
    pub discover_on_miss: bool,

    pub bridges_enabled: bool,
}

impl Default for ClientFeatures {
    fn default() -> Self {
        Self {
            auto_connect: false,
            discover_on_miss: false,
            bridges_enabled: true,
        }
    }
}

/// Outcome of [`OverlayClient::send_message`]. The message is returned in
/// its final state whether or not delivery succeeded.
#[derive(Debug)]
pub struct MessageResult {
    pub message: Message,
    pub error: Option<NetworkError>,
}

impl MessageResult {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Message> {
        match self.error {
            None => Ok(self.message),
            Some(e) => Err(e),
        }
    }
}

/// Client over a shared coordinator
#[derive(Debug, Clone)]
pub struct OverlayClient {
    coordinator: Arc<ProtocolCoordinator>,
    features: ClientFeatures,
}

impl OverlayClient {
    pub fn new(coordinator: Arc<ProtocolCoordinator>) -> Self {
        Self::with_features(coordinator, ClientFeatures::default())
    }

    pub fn with_features(coordinator: Arc<ProtocolCoordinator>, features: ClientFeatures) -> Self {
        Self {
            coordinator,
            features,
        }
    }

    pub fn features(&self) -> ClientFeatures {
        self.features
    }

    pub fn coordinator(&self) -> &Arc<ProtocolCoordinator> {
        &self.coordinator
    }

    pub async fn send_message(
        &self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        content: Vec<u8>,
        message_type: MessageType,
        priority: MessagePriority,
    ) -> MessageResult {
        let mut message = Message::new(source, target, content)
            .with_type(message_type)
            .with_priority(priority);

        if message.source != *self.coordinator.local_node_id() {
            let error = NetworkError::InvalidMessage(format!(
                "source {} is not the local node",
                message.source
            ));
            return MessageResult {
                message,
                error: Some(error.at(Stage::Encrypt)),
            };
        }

        if let Err(e) = self.prepare_target(&message.target).await {
            return MessageResult {
                message,
                error: Some(e),
            };
        }

        let error = self.coordinator.send_message(&mut message).await.err();
        MessageResult { message, error }
    }

    async fn prepare_target(&self, target: &NodeId) -> Result<()> {
        let registry = self.coordinator.registry();

        if self.features.discover_on_miss && !registry.contains(target) {
            debug!(target = %target, "Target unknown, running discovery");
            self.coordinator.discover_and_register_nodes().await?;
        }

        if self.features.auto_connect && !self.coordinator.security().has_active_session(target) {
            if let Some(node) = registry.get_node(target) {
                debug!(target = %target, "No session with target, connecting");
                self.coordinator.connect_to_node(target, &node.address).await?;
            }
        }
        Ok(())
    }

    pub async fn receive_message(&self, message: Message) -> Result<Message> {
        self.coordinator.receive_message(message).await
    }

    pub async fn discover_nodes(&self) -> Result<Vec<Node>> {
        self.coordinator.discover_and_register_nodes().await
    }

    pub fn get_topology(&self) -> Topology {
        self.coordinator.get_topology()
    }

    pub async fn call_through_bridge(&self, capability: &str, request: Vec<u8>) -> Result<Vec<u8>> {
        if !self.features.bridges_enabled {
            return Err(NetworkError::BridgeNotFound(format!(
                "{} (bridges disabled for this client)",
                capability
            ))
            .at(Stage::Bridge));
        }
        self.coordinator.call_through_bridge(capability, request).await
    }
}
