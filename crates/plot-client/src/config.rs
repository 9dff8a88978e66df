//! Client configuration.
//!
//! Layering, lowest priority first: built-in defaults, a TOML file
//! ([`ClientConfig::load`]), `PLOT_*` environment variables
//! ([`ClientConfig::with_env_overrides`]) and finally command line flags set
//! by the caller.
//!
//! # Config File Format
//!
//! ```toml
//! [node]
//! address = "127.0.0.1:8832"
//! connect_timeout_secs = 10
//!
//! [reconnect]
//! base_delay_ms = 500
//! max_delay_secs = 30
//!
//! [client]
//! event_channel_capacity = 1024
//! bus_capacity = 256
//! history_limit = 10
//! cache_file = "/var/lib/plot/cache.json"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while assembling a [`ClientConfig`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// An environment variable held a value of the wrong shape.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },

    /// The assembled configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the connection manager and the client facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Node address: `host:port` (connected over `wss://`) or a full
    /// `ws://`/`wss://` URL.
    pub node: String,
    /// Limit on a single connection attempt.
    pub connect_timeout: Duration,
    /// First reconnect delay; doubles per failed attempt.
    pub backoff_base: Duration,
    /// Upper bound on the reconnect delay.
    pub backoff_cap: Duration,
    /// Capacity of the connection event channel.
    pub event_channel_capacity: usize,
    /// Capacity of the correlation bus.
    pub bus_capacity: usize,
    /// `limit` sent with recent-history requests.
    pub history_limit: u32,
    /// Where [`crate::JsonFileStorage`] keeps the cache snapshot.
    pub cache_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: "127.0.0.1:8832".to_string(),
            connect_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            event_channel_capacity: 1024,
            bus_capacity: plot_bus::DEFAULT_CHANNEL_CAPACITY,
            history_limit: 10,
            cache_file: None,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    node: NodeSection,
    #[serde(default)]
    reconnect: ReconnectSection,
    #[serde(default)]
    client: ClientSection,
}

#[derive(Debug, Deserialize, Default)]
struct NodeSection {
    address: Option<String>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ReconnectSection {
    base_delay_ms: Option<u64>,
    max_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ClientSection {
    event_channel_capacity: Option<usize>,
    bus_capacity: Option<usize>,
    history_limit: Option<u32>,
    cache_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults overlaid with `PLOT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparsable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a TOML file; missing keys keep defaults.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();

        let config = Self {
            node: file.node.address.unwrap_or(defaults.node),
            connect_timeout: file
                .node
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            backoff_base: file
                .reconnect
                .base_delay_ms
                .map_or(defaults.backoff_base, Duration::from_millis),
            backoff_cap: file
                .reconnect
                .max_delay_secs
                .map_or(defaults.backoff_cap, Duration::from_secs),
            event_channel_capacity: file
                .client
                .event_channel_capacity
                .unwrap_or(defaults.event_channel_capacity),
            bus_capacity: file.client.bus_capacity.unwrap_or(defaults.bus_capacity),
            history_limit: file.client.history_limit.unwrap_or(defaults.history_limit),
            cache_file: file.client.cache_file.or(defaults.cache_file),
        };

        config.validate()?;
        Ok(config)
    }

    /// Overlay `PLOT_*` environment variables.
    ///
    /// - `PLOT_NODE`: node address
    /// - `PLOT_CONNECT_TIMEOUT_SECS`: connection attempt limit
    /// - `PLOT_BACKOFF_BASE_MS` / `PLOT_BACKOFF_CAP_SECS`: reconnect delays
    /// - `PLOT_HISTORY_LIMIT`: recent-history page size
    /// - `PLOT_CACHE_FILE`: snapshot location
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(node) = lookup("PLOT_NODE") {
            self.node = node;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "PLOT_CONNECT_TIMEOUT_SECS")? {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PLOT_BACKOFF_BASE_MS")? {
            self.backoff_base = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "PLOT_BACKOFF_CAP_SECS")? {
            self.backoff_cap = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var::<u32>(&lookup, "PLOT_HISTORY_LIMIT")? {
            self.history_limit = limit;
        }
        if let Some(path) = lookup("PLOT_CACHE_FILE") {
            self.cache_file = Some(PathBuf::from(path));
        }

        self.validate()?;
        Ok(self)
    }

    /// Set the node address, e.g. from a `--node` flag.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// The URL the connection manager dials.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        if self.node.contains("://") {
            self.node.clone()
        } else {
            format!("wss://{}", self.node)
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.trim().is_empty() {
            return Err(ConfigError::Invalid("node address is empty".to_string()));
        }
        if self.backoff_base > self.backoff_cap {
            return Err(ConfigError::Invalid(format!(
                "reconnect base delay {:?} exceeds cap {:?}",
                self.backoff_base, self.backoff_cap
            )));
        }
        if self.event_channel_capacity == 0 || self.bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        })
}
