//! Bridge registry
//!
//! Lookup table from capability tags to registered bridges. Bridges are
//! searched in registration order; an offline bridge is never selected.

use overlink_core::{Bridge, BridgeInfo, BridgeStatus};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct BridgeRegistry {
    bridges: RwLock<Vec<Arc<dyn Bridge>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge. A bridge with the same id is replaced in place.
    pub fn register(&self, bridge: Arc<dyn Bridge>) {
        let info = bridge.info();
        let mut bridges = self.bridges.write();
        match bridges.iter().position(|b| b.info().id == info.id) {
            Some(pos) => bridges[pos] = bridge,
            None => bridges.push(bridge),
        }
        info!(bridge = %info.id, capabilities = ?info.capabilities, "Registered bridge");
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut bridges = self.bridges.write();
        let before = bridges.len();
        bridges.retain(|b| b.info().id != id);
        bridges.len() != before
    }

    /// First usable bridge advertising `capability`
    pub fn find(&self, capability: &str) -> Option<Arc<dyn Bridge>> {
        self.bridges
            .read()
            .iter()
            .find(|b| {
                let info = b.info();
                info.status != BridgeStatus::Offline && info.supports(capability)
            })
            .cloned()
    }

    /// Descriptors of every registered bridge, in registration order
    pub fn list(&self) -> Vec<BridgeInfo> {
        self.bridges.read().iter().map(|b| b.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.bridges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.read().is_empty()
    }
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("bridges", &self.list())
            .finish()
    }
}
