//! Descriptors for external ecosystem bridges

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Operational status reported by a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeStatus {
    Active,
    Degraded,
    Offline,
}

/// Static description of a registered bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub id: String,
    pub name: String,

    /// Ecosystem family, e.g. "ledger", "storage", "http"
    pub bridge_type: String,

    pub status: BridgeStatus,
    pub capabilities: BTreeSet<String>,
}

impl BridgeInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        bridge_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bridge_type: bridge_type.into(),
            status: BridgeStatus::Active,
            capabilities: BTreeSet::new(),
        }
    }

    /// Builder: set capability tags
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set status
    pub fn with_status(mut self, status: BridgeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
