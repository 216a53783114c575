use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use overlink_core::{MessagePriority, Node, NodeId, NodeStatus, OverlayConfig};
use overlink_network::{network_health, Link, NodeRegistry, Router};
use std::sync::Arc;
use std::time::Duration;

/// Ring of `size` nodes; every tenth one is directly connected and each
/// node links to its two successors
fn ring(size: usize) -> Arc<NodeRegistry> {
    let registry = Arc::new(NodeRegistry::new());
    for i in 0..size {
        let status = if i % 10 == 0 {
            NodeStatus::Connected
        } else {
            NodeStatus::Discovered
        };
        registry.add_node(
            Node::new(format!("n{}", i), format!("mem://n{}", i))
                .with_metrics(10.0 + (i % 7) as f64 * 15.0, 90 + (i % 10) as u8)
                .with_status(status),
        );
    }
    for i in 0..size {
        for step in 1..=2 {
            let to = (i + step) % size;
            registry.add_link(Link::new(
                format!("n{}", i),
                format!("n{}", to),
                5.0 * step as f64,
                95,
            ));
        }
    }
    registry
}

fn route_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_search");
    group.measurement_time(Duration::from_secs(5));

    let config = OverlayConfig::default();
    for size in [16usize, 64, 256] {
        let registry = ring(size);
        let router = Router::new(&config, registry);
        let target = NodeId::from(format!("n{}", size / 2 + 3));

        group.bench_with_input(BenchmarkId::new("cold", size), &size, |b, _| {
            b.iter(|| {
                router.invalidate();
                black_box(router.plan_route(&target, MessagePriority::Critical).ok())
            });
        });

        group.bench_with_input(BenchmarkId::new("cached", size), &size, |b, _| {
            b.iter(|| black_box(router.plan_route(&target, MessagePriority::Critical).ok()));
        });
    }

    group.finish();
}

fn health_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("health_score");
    let config = OverlayConfig::default();
    let nodes = ring(256).list_nodes();

    group.bench_function("network_health_256", |b| {
        b.iter(|| black_box(network_health(&config.health, &nodes)));
    });

    group.finish();
}

criterion_group!(benches, route_search, health_score);
criterion_main!(benches);
