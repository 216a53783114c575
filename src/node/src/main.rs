//! Overlink Node - Main Binary
//!
//! Runs an overlay coordinator against a set of in-process peers described
//! in a TOML file, sending demo traffic until interrupted.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use overlink_node::{NodeConfig, OverlayNode};

/// Overlink Node CLI
#[derive(Parser)]
#[command(name = "overlink-node")]
#[command(about = "Overlink secure overlay node (in-memory demo)")]
#[command(version)]
struct Cli {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long, env = "OVERLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Node ID (overrides config)
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    /// Validate the configuration and exit
    Check,

    /// Print the effective configuration as TOML
    ShowConfig,

    /// Show node version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(node_id) = cli.node_id {
        config.overlay.local_node_id = node_id;
    }

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { config.node.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},overlink_node=debug", log_level).into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    if let Some(cmd) = cli.command {
        match cmd {
            Command::Check => {
                config.validate()?;
                println!("Configuration OK");
                return Ok(());
            }
            Command::ShowConfig => {
                println!("{}", toml::to_string_pretty(&config)?);
                return Ok(());
            }
            Command::Version => {
                println!("Overlink Node v{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
        }
    }

    info!("Starting Overlink Node v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {:?}", path);
    }

    let node = OverlayNode::new(config)?;

    // Run node with graceful shutdown
    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("Node error: {:#}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal (SIGTERM)");
        }
    }

    node.shutdown().await?;
    info!("Node stopped gracefully");
    Ok(())
}

/// Cross-platform shutdown signal handling
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix systems, only Ctrl+C is supported
    std::future::pending::<()>().await
}
