//! Network-wide agreement tracking
//!
//! Peers report the ledger height and state hash they currently hold. The
//! tracker groups healthy reports by `(height, state_hash)` and compares the
//! largest group against the configured quorum.

use crate::registry::NodeRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use overlink_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One peer's view of shared state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub height: u64,
    pub state_hash: String,
    pub healthy: bool,
}

impl ConsensusReport {
    pub fn new(height: u64, state_hash: impl Into<String>) -> Self {
        Self {
            height,
            state_hash: state_hash.into(),
            healthy: true,
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }
}

/// Aggregate agreement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusState {
    /// Nothing reported yet
    Unknown,
    /// Too few connected peers reported to judge
    Insufficient,
    /// The largest group of matching reports reaches quorum
    Agreed,
    /// Reports disagree below quorum
    Diverged,
}

/// Snapshot returned by [`ConsensusTracker::status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub state: ConsensusState,

    /// Largest matching group over all participating peers (0.0 to 1.0)
    pub agreement_ratio: f64,

    pub participating: usize,
    pub quorum: f64,

    /// Height and hash of the largest matching group
    pub height: Option<u64>,
    pub state_hash: Option<String>,
}

impl ConsensusStatus {
    fn unknown(quorum: f64) -> Self {
        Self {
            state: ConsensusState::Unknown,
            agreement_ratio: 0.0,
            participating: 0,
            quorum,
            height: None,
            state_hash: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    report: ConsensusReport,
    received_at: DateTime<Utc>,
}

/// Collects consensus reports from registered peers
#[derive(Debug)]
pub struct ConsensusTracker {
    registry: Arc<NodeRegistry>,
    reports: DashMap<NodeId, Entry>,
    quorum: f64,
}

impl ConsensusTracker {
    pub fn new(registry: Arc<NodeRegistry>, quorum: f64) -> Self {
        Self {
            registry,
            reports: DashMap::new(),
            quorum,
        }
    }

    /// Record a report. Reports from unregistered nodes are dropped.
    pub fn report(&self, node_id: &NodeId, report: ConsensusReport) -> bool {
        if !self.registry.contains(node_id) {
            warn!(node = %node_id, "Consensus report from unknown node ignored");
            return false;
        }
        debug!(node = %node_id, height = report.height, healthy = report.healthy, "Consensus report");
        self.reports.insert(
            node_id.clone(),
            Entry {
                report,
                received_at: Utc::now(),
            },
        );
        true
    }

    /// Time of the latest report from a node
    pub fn last_report(&self, node_id: &NodeId) -> Option<DateTime<Utc>> {
        self.reports.get(node_id).map(|e| e.received_at)
    }

    pub fn forget(&self, node_id: &NodeId) {
        self.reports.remove(node_id);
    }

    pub fn clear(&self) {
        self.reports.clear();
    }

    pub fn status(&self) -> ConsensusStatus {
        // nodes may have left the registry since reporting
        self.reports.retain(|node_id, _| self.registry.contains(node_id));

        let reports: Vec<ConsensusReport> =
            self.reports.iter().map(|e| e.report.clone()).collect();
        let participating = reports.len();
        if participating == 0 {
            return ConsensusStatus::unknown(self.quorum);
        }

        let mut groups: HashMap<(u64, &str), usize> = HashMap::new();
        for report in reports.iter().filter(|r| r.healthy) {
            *groups.entry((report.height, report.state_hash.as_str())).or_insert(0) += 1;
        }
        // highest count wins, then highest height, then hash for a stable pick
        let leader = groups
            .into_iter()
            .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(ka.0.cmp(&kb.0)).then(kb.1.cmp(ka.1)));

        let (height, state_hash, largest) = match leader {
            Some(((height, hash), count)) => (Some(height), Some(hash.to_string()), count),
            None => (None, None, 0),
        };
        let agreement_ratio = largest as f64 / participating as f64;

        let eligible = self.registry.connected_count().max(participating);
        let state = if (participating as f64) / (eligible as f64) < self.quorum {
            ConsensusState::Insufficient
        } else if agreement_ratio >= self.quorum {
            ConsensusState::Agreed
        } else {
            ConsensusState::Diverged
        };

        ConsensusStatus {
            state,
            agreement_ratio,
            participating,
            quorum: self.quorum,
            height,
            state_hash,
        }
    }
}
