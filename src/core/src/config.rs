//! Overlay configuration
//!
//! `OverlayConfig` is what an external loader hands to the coordinator. Every
//! field has a default, so partial TOML or JSON documents deserialize cleanly.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How strictly inbound messages are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Signature and AEAD checks only
    #[default]
    Standard,
    /// Additionally rejects messages sealed outside the replay window
    Strict,
}

/// A statically configured discovery entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapNode {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Edge cost weights used by the router.
///
/// `cost = latency_weight * min(latency / latency_ceiling_ms, 1)
///       + reliability_weight * (1 - reliability / 100)
///       + hop_penalty`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingWeights {
    pub latency_weight: f64,
    pub reliability_weight: f64,
    pub latency_ceiling_ms: f64,
    pub hop_penalty: f64,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            latency_weight: 0.5,
            reliability_weight: 0.5,
            latency_ceiling_ms: 1000.0,
            hop_penalty: 0.01,
        }
    }
}

/// Weights and thresholds for the network health score.
///
/// These are tunable policy, not protocol constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    pub reachability_weight: f64,
    pub latency_weight: f64,
    pub reliability_weight: f64,

    /// Latency at or below this scores 1.0
    pub optimal_latency_ms: f64,

    /// Latency at or above this scores 0.0
    pub max_latency_ms: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            reachability_weight: 0.4,
            latency_weight: 0.3,
            reliability_weight: 0.3,
            optimal_latency_ms: 50.0,
            max_latency_ms: 1000.0,
        }
    }
}

/// Complete overlay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Identifier of the local node
    pub local_node_id: String,

    /// AEAD algorithm: "AES-256-GCM", "AES-128-GCM" or "ChaCha20-Poly1305"
    pub encryption_algorithm: String,
    pub key_size_bits: u32,
    pub security_mode: SecurityMode,
    pub replay_window_secs: u64,

    /// Hex-encoded 32-byte seed for the identity key; random when absent
    pub master_key_seed: Option<String>,

    pub session_timeout_hours: f64,
    pub connection_timeout_ms: u64,

    /// Hard ceiling on route length
    pub max_hops: usize,
    /// Route length allowed at priority 0
    pub base_hop_limit: usize,
    /// Extra hops granted per priority level
    pub hops_per_priority: usize,

    /// Multiplier from recorded latency to simulated per-hop delay
    pub latency_time_scale: f64,

    pub discovery_interval_ms: u64,
    pub session_expiry_interval_ms: u64,
    pub node_expiry_secs: u64,

    /// Connect to discovered nodes automatically on each discovery tick
    pub auto_connect: bool,
    pub max_connections: usize,

    pub bootstrap_nodes: Vec<BootstrapNode>,
    pub routing: RoutingWeights,
    pub health: HealthPolicy,

    /// Fraction of reporting peers that must agree for consensus
    pub consensus_quorum: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            local_node_id: "local".to_string(),
            encryption_algorithm: "AES-256-GCM".to_string(),
            key_size_bits: 256,
            security_mode: SecurityMode::Standard,
            replay_window_secs: 300,
            master_key_seed: None,
            session_timeout_hours: 24.0,
            connection_timeout_ms: 5_000,
            max_hops: 8,
            base_hop_limit: 4,
            hops_per_priority: 1,
            latency_time_scale: 1.0,
            discovery_interval_ms: 30_000,
            session_expiry_interval_ms: 60_000,
            node_expiry_secs: 600,
            auto_connect: false,
            max_connections: 64,
            bootstrap_nodes: Vec::new(),
            routing: RoutingWeights::default(),
            health: HealthPolicy::default(),
            consensus_quorum: 2.0 / 3.0,
        }
    }
}

/// Longest session lifetime `validate` accepts (ten years)
pub const MAX_SESSION_TIMEOUT_HOURS: f64 = 87_600.0;

/// Longest replay window or node expiry `validate` accepts (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 86_400;

/// Longest handshake wait or tick interval `validate` accepts (one day)
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl OverlayConfig {
    /// Session lifetime, saturating for out-of-range values
    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::try_milliseconds((self.session_timeout_hours * 3_600_000.0) as i64)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Handshake wait bound
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn session_expiry_interval(&self) -> Duration {
        Duration::from_millis(self.session_expiry_interval_ms)
    }

    pub fn node_expiry(&self) -> chrono::Duration {
        seconds(self.node_expiry_secs)
    }

    pub fn replay_window(&self) -> chrono::Duration {
        seconds(self.replay_window_secs)
    }

    /// Route length allowed for a priority level, never above `max_hops`
    pub fn hop_limit(&self, priority_level: usize) -> usize {
        self.base_hop_limit
            .saturating_add(priority_level.saturating_mul(self.hops_per_priority))
            .min(self.max_hops)
    }

    /// Validate ranges and cross-field constraints.
    ///
    /// Algorithm names are checked by the security layer, which owns the
    /// list of supported ciphers.
    pub fn validate(&self) -> Result<()> {
        if self.local_node_id.trim().is_empty() {
            return Err(CoreError::configuration("local_node_id must not be empty"));
        }
        if !self.session_timeout_hours.is_finite() || self.session_timeout_hours < 0.0 {
            return Err(CoreError::configuration(
                "session_timeout_hours must be a non-negative number",
            ));
        }
        if self.session_timeout_hours > MAX_SESSION_TIMEOUT_HOURS {
            return Err(CoreError::configuration(format!(
                "session_timeout_hours must be at most {}",
                MAX_SESSION_TIMEOUT_HOURS
            )));
        }
        if self.connection_timeout_ms == 0 || self.connection_timeout_ms > MAX_INTERVAL_MS {
            return Err(CoreError::configuration(format!(
                "connection_timeout_ms must be between 1 and {}",
                MAX_INTERVAL_MS
            )));
        }
        if self.replay_window_secs > MAX_WINDOW_SECS || self.node_expiry_secs > MAX_WINDOW_SECS {
            return Err(CoreError::configuration(format!(
                "replay_window_secs and node_expiry_secs must be at most {}",
                MAX_WINDOW_SECS
            )));
        }
        if self.max_hops == 0 {
            return Err(CoreError::configuration("max_hops must be >= 1"));
        }
        if self.base_hop_limit == 0 || self.base_hop_limit > self.max_hops {
            return Err(CoreError::configuration(format!(
                "base_hop_limit must be between 1 and max_hops ({})",
                self.max_hops
            )));
        }
        if !self.latency_time_scale.is_finite() || self.latency_time_scale < 0.0 {
            return Err(CoreError::configuration(
                "latency_time_scale must be a non-negative number",
            ));
        }
        for interval in [self.discovery_interval_ms, self.session_expiry_interval_ms] {
            if interval == 0 || interval > MAX_INTERVAL_MS {
                return Err(CoreError::configuration(format!(
                    "tick intervals must be between 1 and {} ms",
                    MAX_INTERVAL_MS
                )));
            }
        }
        if !(self.consensus_quorum > 0.0 && self.consensus_quorum <= 1.0) {
            return Err(CoreError::configuration("consensus_quorum must be in (0, 1]"));
        }

        let r = &self.routing;
        if [r.latency_weight, r.reliability_weight, r.hop_penalty]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(CoreError::configuration("routing weights must be non-negative"));
        }
        if !(r.latency_ceiling_ms > 0.0) {
            return Err(CoreError::configuration("routing.latency_ceiling_ms must be > 0"));
        }

        let h = &self.health;
        let weights = [h.reachability_weight, h.latency_weight, h.reliability_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CoreError::configuration("health weights must be non-negative"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(CoreError::configuration("health weights must not all be zero"));
        }
        if !(h.optimal_latency_ms >= 0.0 && h.optimal_latency_ms < h.max_latency_ms) {
            return Err(CoreError::configuration(
                "health.optimal_latency_ms must be below health.max_latency_ms",
            ));
        }

        for node in &self.bootstrap_nodes {
            if node.id.trim().is_empty() || node.address.trim().is_empty() {
                return Err(CoreError::configuration(
                    "bootstrap nodes need a non-empty id and address",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OverlayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.encryption_algorithm, "AES-256-GCM");
        assert_eq!(config.health.reachability_weight, 0.4);
    }

    #[test]
    fn test_hop_limit_respects_ceiling() {
        let config = OverlayConfig {
            max_hops: 6,
            base_hop_limit: 3,
            hops_per_priority: 2,
            ..Default::default()
        };
        assert_eq!(config.hop_limit(0), 3);
        assert_eq!(config.hop_limit(1), 5);
        assert_eq!(config.hop_limit(3), 6);
        assert_eq!(config.hop_limit(usize::MAX), 6);
    }

    #[test]
    fn test_zero_session_timeout_is_allowed() {
        let config = OverlayConfig {
            session_timeout_hours: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.session_timeout(), chrono::Duration::zero());
    }

    #[test]
    fn test_duration_helpers_saturate() {
        let config = OverlayConfig {
            session_timeout_hours: 1e12,
            replay_window_secs: u64::MAX,
            node_expiry_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.session_timeout() > chrono::Duration::days(365 * 1_000_000));
        assert_eq!(config.replay_window(), chrono::Duration::MAX);
        assert_eq!(config.node_expiry(), chrono::Duration::MAX);

        let longest = OverlayConfig {
            session_timeout_hours: MAX_SESSION_TIMEOUT_HOURS,
            replay_window_secs: MAX_WINDOW_SECS,
            node_expiry_secs: MAX_WINDOW_SECS,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());
        assert_eq!(longest.replay_window(), chrono::Duration::days(365));
    }

    #[test]
    fn test_invalid_configs() {
        let cases = vec![
            OverlayConfig { max_hops: 0, ..Default::default() },
            OverlayConfig { base_hop_limit: 9, ..Default::default() },
            OverlayConfig { connection_timeout_ms: 0, ..Default::default() },
            OverlayConfig { session_timeout_hours: -1.0, ..Default::default() },
            OverlayConfig { session_timeout_hours: 1e12, ..Default::default() },
            OverlayConfig { replay_window_secs: u64::MAX, ..Default::default() },
            OverlayConfig { node_expiry_secs: u64::MAX, ..Default::default() },
            OverlayConfig { connection_timeout_ms: u64::MAX, ..Default::default() },
            OverlayConfig { discovery_interval_ms: u64::MAX, ..Default::default() },
            OverlayConfig { consensus_quorum: 0.0, ..Default::default() },
            OverlayConfig { local_node_id: " ".into(), ..Default::default() },
            OverlayConfig {
                health: HealthPolicy { optimal_latency_ms: 2000.0, ..Default::default() },
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(CoreError::Configuration(_))),
                "expected rejection: {:?}",
                config
            );
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OverlayConfig = toml::from_str(
            r#"
            local_node_id = "edge-1"
            encryption_algorithm = "ChaCha20-Poly1305"
            security_mode = "strict"

            [[bootstrap_nodes]]
            id = "seed-1"
            address = "10.0.0.1:7000"
            capabilities = ["ledger"]

            [health]
            optimal_latency_ms = 20.0
            "#,
        )
        .unwrap();

        assert_eq!(config.local_node_id, "edge-1");
        assert_eq!(config.security_mode, SecurityMode::Strict);
        assert_eq!(config.bootstrap_nodes.len(), 1);
        assert_eq!(config.health.optimal_latency_ms, 20.0);
        assert_eq!(config.health.max_latency_ms, 1000.0);
        assert_eq!(config.max_hops, 8);
        assert!(config.validate().is_ok());
    }
}
