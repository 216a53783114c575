//! Network health score
//!
//! `health = w_r * reachable + w_l * latency_health + w_q * reliability_health`
//! over the registry, normalized by the weight sum. Reachability is the
//! connected fraction of all known nodes. Latency and reliability health
//! are means over connected nodes. The weights and latency thresholds come
//! from [`HealthPolicy`] and are tunable.

use overlink_core::types::node::MAX_RELIABILITY;
use overlink_core::{HealthPolicy, Node};

/// 1.0 at or below the optimal latency, 0.0 at or above the maximum,
/// linear in between
pub fn latency_health(policy: &HealthPolicy, latency_ms: f64) -> f64 {
    if latency_ms <= policy.optimal_latency_ms {
        1.0
    } else if latency_ms >= policy.max_latency_ms {
        0.0
    } else {
        (policy.max_latency_ms - latency_ms) / (policy.max_latency_ms - policy.optimal_latency_ms)
    }
}

/// Score in `[0, 1]`. An empty node set scores 0.
pub fn network_health(policy: &HealthPolicy, nodes: &[Node]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    let connected: Vec<&Node> = nodes.iter().filter(|n| n.is_connected()).collect();
    let reachable = connected.len() as f64 / nodes.len() as f64;

    let (latency, reliability) = if connected.is_empty() {
        (0.0, 0.0)
    } else {
        let count = connected.len() as f64;
        let latency = connected
            .iter()
            .map(|n| latency_health(policy, n.latency_ms))
            .sum::<f64>()
            / count;
        let reliability = connected
            .iter()
            .map(|n| f64::from(n.reliability) / f64::from(MAX_RELIABILITY))
            .sum::<f64>()
            / count;
        (latency, reliability)
    };

    let total_weight = policy.reachability_weight + policy.latency_weight + policy.reliability_weight;
    if total_weight <= 0.0 {
        return 0.0;
    }
    let score = (policy.reachability_weight * reachable
        + policy.latency_weight * latency
        + policy.reliability_weight * reliability)
        / total_weight;
    score.clamp(0.0, 1.0)
}
