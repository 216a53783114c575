//! Node configuration loading and validation

use anyhow::{Context, Result};
use overlink_core::OverlayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete node configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,

    /// Overlay settings, handed to the coordinator unchanged
    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub demo: DemoSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between topology summaries in the log
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            report_interval_secs: default_report_interval(),
        }
    }
}

/// In-process peers the demo overlay is populated with
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoSection {
    #[serde(default)]
    pub peers: Vec<DemoPeer>,

    /// Milliseconds between demo messages; 0 disables sending
    #[serde(default = "default_message_interval")]
    pub message_interval_ms: u64,
}

impl Default for DemoSection {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            message_interval_ms: default_message_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoPeer {
    pub id: String,
    #[serde(default = "default_peer_latency")]
    pub latency_ms: f64,
    #[serde(default = "default_peer_reliability")]
    pub reliability: u8,
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Peers this one can forward to directly
    #[serde(default)]
    pub links: Vec<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_report_interval() -> u64 { 10 }
fn default_message_interval() -> u64 { 2_000 }
fn default_peer_latency() -> f64 { 25.0 }
fn default_peer_reliability() -> u8 { 95 }

impl NodeConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {:?}", path.as_ref()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration file")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.overlay
            .validate()
            .context("Invalid [overlay] section")?;

        let local = self.overlay.local_node_id.as_str();
        for peer in &self.demo.peers {
            if peer.id == local {
                anyhow::bail!("Demo peer '{}' reuses the local node id", peer.id);
            }
            if peer.reliability > 100 {
                anyhow::bail!("Demo peer '{}' reliability must be 0-100", peer.id);
            }
            if let Some(unknown) = peer
                .links
                .iter()
                .find(|l| !self.demo.peers.iter().any(|p| &p.id == *l))
            {
                anyhow::bail!("Demo peer '{}' links to unknown peer '{}'", peer.id, unknown);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = NodeConfig::parse("").unwrap();
        assert_eq!(config.node.log_level, "info");
        assert_eq!(config.overlay, OverlayConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let config = NodeConfig::parse(
            r#"
            [overlay]
            local_node_id = "edge-1"
            encryption_algorithm = "ChaCha20-Poly1305"
            latency_time_scale = 0.0

            [[demo.peers]]
            id = "relay"
            latency_ms = 12.0
            links = ["far"]

            [[demo.peers]]
            id = "far"
            reliability = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.overlay.local_node_id, "edge-1");
        assert_eq!(config.demo.peers.len(), 2);
        assert_eq!(config.demo.peers[1].latency_ms, 25.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_link_rejected() {
        let config = NodeConfig::parse(
            r#"
            [[demo.peers]]
            id = "a"
            links = ["ghost"]
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_overlay_rejected() {
        let config = NodeConfig::parse("[overlay]\nmax_hops = 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
