//! # Overlink Network Module
//!
//! Overlay plumbing on top of the session layer in `overlink-crypto`:
//! node registry, latency/reliability aware routing, discovery, consensus
//! tracking and external bridges, all driven by the [`ProtocolCoordinator`].
//!
//! ## Module Structure
//!
//! ```text
//! network/
//! ├── registry     - Known nodes, links and their live metrics
//! ├── router       - Hop-bounded least-cost route search
//! ├── discovery    - Bootstrap and gossip discovery sources
//! ├── consensus    - Agreement tracking over peer reports
//! ├── bridge       - External system adapters
//! ├── health       - Network health scoring
//! ├── topology     - Point-in-time network snapshot
//! ├── coordinator  - Lifecycle and end-to-end message flow
//! └── client       - Upper-layer client surface
//! ```

pub mod bridge;
pub mod client;
pub mod consensus;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod health;
pub mod registry;
pub mod router;
pub mod topology;

pub use bridge::BridgeRegistry;
pub use client::{ClientFeatures, MessageResult, OverlayClient};
pub use consensus::{ConsensusReport, ConsensusState, ConsensusStatus, ConsensusTracker};
pub use coordinator::{CoordinatorBuilder, NetworkState, ProtocolCoordinator};
pub use discovery::{BootstrapSource, DiscoveredNode, Discovery, DiscoverySource, GossipTable};
pub use error::{ErrorKind, NetworkError, Result, Stage};
pub use health::{latency_health, network_health};
pub use registry::{Link, NodeRegistry};
pub use router::{Route, Router};
pub use topology::Topology;
