//! plot-cli: query a plotthread node from the terminal.
//!
//! Opens the shared connection, issues one request, waits for the matching
//! correlation signal (or for the cache entry to appear) and prints the
//! result as JSON.
//!
//! ## Usage
//!
//! ```bash
//! # Tip header from the default node
//! plot-cli tip
//!
//! # Balance of a key on another node, with debug logs
//! plot-cli --node node.example.com:8832 -v balance 'AAAA...='
//!
//! # Relationship graph above a 40% score threshold
//! plot-cli graph 'AAAA...=' --threshold 40
//! ```

mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plot_client::{
    CacheStorage, ClientConfig, ConnectionManager, JsonFileStorage, MemoryStorage, PlotClient,
};
use plot_telemetry::{init_telemetry, TelemetryConfig};
use tracing::debug;

/// Plotthread node command line client
#[derive(Parser, Debug)]
#[command(name = "plot-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Node address (`host:port` or a ws:// / wss:// URL)
    #[arg(long, global = true)]
    node: Option<String>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for the node to answer
    #[arg(long, global = true, default_value = "10")]
    timeout: u64,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Current tip header
    Tip,
    /// A block by height or id
    Block {
        /// Block height
        #[arg(conflicts_with = "id", required_unless_present = "id")]
        height: Option<u64>,
        /// Block id
        #[arg(long)]
        id: Option<String>,
    },
    /// Balance of a key
    Balance { key: String },
    /// Ranking score of a key
    Ranking { key: String },
    /// Scores of several keys, highest first
    Rankings {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Relationship graph around a key
    Graph {
        key: String,
        /// Minimum score in percent
        #[arg(long, default_value = "0")]
        threshold: f64,
    },
    /// Most recent exchanges of a key
    History { key: String },
    /// Pending exchanges involving a key
    Pending { key: String },
    /// Print correlation signals until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if cli.verbose {
        telemetry = telemetry.with_log_level("debug");
    }
    telemetry.json_logs |= cli.json_logs;
    let _telemetry = init_telemetry(telemetry).context("Failed to initialise telemetry")?;

    let config = load_config(&cli)?;
    let storage: Arc<dyn CacheStorage> = match &config.cache_file {
        Some(path) => Arc::new(JsonFileStorage::new(path)),
        None => Arc::new(MemoryStorage::new()),
    };

    let (manager, events) =
        ConnectionManager::start(&config).context("Invalid client configuration")?;
    let client = Arc::new(
        PlotClient::builder(Arc::new(manager.clone()))
            .config(config)
            .storage(storage)
            .build()
            .context("Failed to build client")?,
    );

    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(events).await })
    };

    let limit = Duration::from_secs(cli.timeout);
    let result = commands::execute(&client, cli.command, limit).await;

    if let Err(e) = client.persist() {
        tracing::warn!(error = %e, "Failed to save cache snapshot");
    }
    manager.shutdown();
    if tokio::time::timeout(Duration::from_secs(2), runner).await.is_err() {
        debug!("Event loop still running at exit");
    }

    result
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(node) = &cli.node {
        config = config.with_node(node.clone());
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_block_requires_height_or_id() {
        assert!(Cli::try_parse_from(["plot-cli", "block"]).is_err());
        assert!(Cli::try_parse_from(["plot-cli", "block", "3"]).is_ok());
        assert!(Cli::try_parse_from(["plot-cli", "block", "--id", "abc"]).is_ok());
        assert!(Cli::try_parse_from(["plot-cli", "block", "3", "--id", "abc"]).is_err());
    }

    #[test]
    fn test_node_flag_overrides_config() {
        let cli = Cli::try_parse_from(["plot-cli", "--node", "ws://localhost:1", "tip"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.endpoint_url(), "ws://localhost:1");
    }
}
