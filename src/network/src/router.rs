//! Cost-based route selection over the node registry
//!
//! Edges from the local node exist to every connected node and are priced
//! with that node's metrics. Edges between remote nodes come from gossip
//! links. The search is a hop-bounded Bellman-Ford relaxation that visits
//! nodes in registry insertion order and only accepts strictly cheaper
//! candidates, so equal-cost alternatives resolve to the earliest-inserted
//! predecessor and then to the fewest hops.

use crate::error::{NetworkError, Result};
use crate::registry::NodeRegistry;
use overlink_core::types::node::MAX_RELIABILITY;
use overlink_core::{MessagePriority, NodeId, NodeStatus, OverlayConfig, RoutingWeights};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Cost of traversing one edge with the given metrics
pub fn edge_cost(weights: &RoutingWeights, latency_ms: f64, reliability: u8) -> f64 {
    let latency = (latency_ms / weights.latency_ceiling_ms).clamp(0.0, 1.0);
    let unreliability =
        1.0 - f64::from(reliability.min(MAX_RELIABILITY)) / f64::from(MAX_RELIABILITY);
    weights.latency_weight * latency + weights.reliability_weight * unreliability + weights.hop_penalty
}

/// A computed path, excluding the local node, ending at the target
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub hops: Vec<NodeId>,
    pub cost: f64,
}

#[derive(Debug, Default)]
struct RouteCache {
    version: u64,
    routes: HashMap<(NodeId, usize), Route>,
}

/// Router over a shared, read-only view of the registry
#[derive(Debug)]
pub struct Router {
    local_id: NodeId,
    registry: Arc<NodeRegistry>,
    weights: RoutingWeights,
    config: OverlayConfig,
    cache: Mutex<RouteCache>,
}

impl Router {
    pub fn new(config: &OverlayConfig, registry: Arc<NodeRegistry>) -> Self {
        Self {
            local_id: NodeId::from(config.local_node_id.as_str()),
            registry,
            weights: config.routing.clone(),
            config: config.clone(),
            cache: Mutex::new(RouteCache::default()),
        }
    }

    /// Hop bound for a priority
    pub fn hop_limit(&self, priority: MessagePriority) -> usize {
        self.config.hop_limit(priority.level())
    }

    /// Path to `target` for a message of the given priority
    pub fn find_route(&self, target: &NodeId, priority: MessagePriority) -> Result<Vec<NodeId>> {
        self.plan_route(target, priority).map(|route| route.hops)
    }

    /// Like [`Router::find_route`], also reporting the path cost
    pub fn plan_route(&self, target: &NodeId, priority: MessagePriority) -> Result<Route> {
        let limit = self.hop_limit(priority);
        let version = self.registry.version();
        let key = (target.clone(), limit);

        {
            let cache = self.cache.lock();
            if cache.version == version {
                if let Some(route) = cache.routes.get(&key) {
                    return Ok(route.clone());
                }
            }
        }

        let route = self.search(target, limit)?;
        debug!(target = %target, hops = route.hops.len(), cost = route.cost, "Computed route");

        let mut cache = self.cache.lock();
        if cache.version != version {
            cache.routes.clear();
            cache.version = version;
        }
        cache.routes.insert(key, route.clone());
        Ok(route)
    }

    /// Note a node joining the registry
    pub fn add_node(&self, node_id: &NodeId) {
        debug!(node = %node_id, "Routing view gained node");
        self.invalidate();
    }

    /// Note a node leaving the registry
    pub fn remove_node(&self, node_id: &NodeId) {
        debug!(node = %node_id, "Routing view lost node");
        self.invalidate();
    }

    pub fn invalidate(&self) {
        self.cache.lock().routes.clear();
    }

    fn search(&self, target: &NodeId, limit: usize) -> Result<Route> {
        if *target == self.local_id {
            return Err(NetworkError::route_not_found(target, "target is the local node"));
        }

        let nodes: Vec<_> = self
            .registry
            .list_nodes()
            .into_iter()
            .filter(|n| n.status != NodeStatus::Disconnected && n.id != self.local_id)
            .collect();
        if nodes.is_empty() {
            return Err(NetworkError::route_not_found(target, "registry is empty"));
        }

        // index 0 is the local node, remote nodes follow in insertion order
        let index: HashMap<&NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (&n.id, i + 1)).collect();
        let target_idx = *index
            .get(target)
            .ok_or_else(|| NetworkError::route_not_found(target, "unknown node"))?;

        let size = nodes.len() + 1;
        let mut edges: Vec<Vec<(usize, f64)>> = vec![Vec::new(); size];
        for (i, node) in nodes.iter().enumerate() {
            if node.is_connected() {
                edges[0].push((i + 1, edge_cost(&self.weights, node.latency_ms, node.reliability)));
            }
        }
        for link in self.registry.links() {
            if let (Some(&from), Some(&to)) = (index.get(&link.from), index.get(&link.to)) {
                edges[from].push((to, edge_cost(&self.weights, link.latency_ms, link.reliability)));
            }
        }
        for out in edges.iter_mut() {
            out.sort_by_key(|(to, _)| *to);
        }

        // layer k holds the cheapest cost of reaching each node in exactly k hops
        let mut cost = vec![f64::INFINITY; size];
        cost[0] = 0.0;
        let mut parents: Vec<Vec<Option<usize>>> = Vec::with_capacity(limit);
        let mut best: Option<(usize, f64)> = None;

        for layer in 1..=limit {
            let mut next = vec![f64::INFINITY; size];
            let mut parent = vec![None; size];
            for (from, out) in edges.iter().enumerate() {
                if !cost[from].is_finite() {
                    continue;
                }
                for &(to, weight) in out {
                    let candidate = cost[from] + weight;
                    if candidate < next[to] {
                        next[to] = candidate;
                        parent[to] = Some(from);
                    }
                }
            }
            parents.push(parent);

            if next[target_idx] < best.map_or(f64::INFINITY, |(_, c)| c) {
                best = Some((layer, next[target_idx]));
            }
            if next.iter().all(|c| !c.is_finite()) {
                break;
            }
            cost = next;
        }

        let (layers, total) = best.ok_or_else(|| {
            NetworkError::route_not_found(target, format!("unreachable within {} hops", limit))
        })?;

        let mut hops = Vec::with_capacity(layers);
        let mut at = target_idx;
        for layer in (0..layers).rev() {
            hops.push(nodes[at - 1].id.clone());
            at = match parents[layer][at] {
                Some(p) => p,
                None => {
                    return Err(NetworkError::route_not_found(target, "broken predecessor chain"))
                }
            };
        }
        hops.reverse();

        Ok(Route { hops, cost: total })
    }
}
