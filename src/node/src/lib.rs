//! Overlink Node Library
//!
//! Configuration loading and the in-process demo overlay driven by the
//! `overlink-node` binary.

pub mod config;
pub mod node;

pub use config::NodeConfig;
pub use node::OverlayNode;
