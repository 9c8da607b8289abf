//! Configuration loading and typed config structures for the occupancy
//! monitor.
//!
//! The configuration lives in `occupancy-config.yaml` next to the binary's
//! working directory. Every field has a default, so an absent file or a
//! partial file is valid. Connection settings can be overridden from the
//! environment so deployments do not need to edit the YAML.

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::debounce::{DEFAULT_HEARTBEAT_MINUTES, DebouncePolicy};
use crate::fanout::{DEFAULT_BROADCAST_CAPACITY, MAX_BROADCAST_CAPACITY};
use crate::pipeline::PipelineOptions;

/// Shortest accepted viewer ping interval, in seconds.
pub const MIN_PING_INTERVAL_SECS: u64 = 1;

/// Longest accepted viewer ping interval, in seconds (one day).
pub const MAX_PING_INTERVAL_SECS: u64 = 86_400;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value for {name}: {value:?}")]
    InvalidOverride {
        /// The environment variable.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
///
/// Mirrors the structure of `occupancy-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    /// Sensor channel subscription.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Readings database.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Debounce policy.
    #[serde(default)]
    pub debounce: DebounceConfig,

    /// HTTP and `WebSocket` server.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] for a bad environment value.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] for a bad environment value.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_yaml(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Deserialize without environment overrides, clamping out-of-range
    /// values.
    fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.observer.clamp_ranges();
        Ok(config)
    }

    /// Override connection settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if `OBSERVER_PORT` is not a
    /// port number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override connection settings from an arbitrary lookup.
    ///
    /// Recognized keys: `NATS_URL`, `NATS_SUBJECT`, `DATABASE_URL`,
    /// `OBSERVER_PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if `OBSERVER_PORT` is not a
    /// port number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("NATS_URL") {
            self.ingest.nats_url = val;
        }
        if let Some(val) = lookup("NATS_SUBJECT") {
            self.ingest.subject = val;
        }
        if let Some(val) = lookup("DATABASE_URL") {
            self.storage.database_url = val;
        }
        if let Some(val) = lookup("OBSERVER_PORT") {
            self.observer.port =
                val.parse()
                    .ok()
                    .ok_or_else(|| ConfigError::InvalidOverride {
                        name: "OBSERVER_PORT",
                        value: val.clone(),
                    })?;
        }
        Ok(())
    }

    /// Pipeline settings derived from this configuration.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            policy: DebouncePolicy::new(
                TimeDelta::try_minutes(self.debounce.heartbeat_minutes).unwrap_or(TimeDelta::MAX),
            ),
            write_timeout: Duration::from_millis(self.storage.write_timeout_ms),
        }
    }
}

/// Sensor channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Subject the door sensor publishes on.
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            subject: default_subject(),
        }
    }
}

/// Readings database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Upper bound on one append, in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

/// Debounce configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DebounceConfig {
    /// Persist an unchanged count once this many minutes have passed.
    #[serde(default = "default_heartbeat_minutes")]
    pub heartbeat_minutes: i64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            heartbeat_minutes: default_heartbeat_minutes(),
        }
    }
}

/// HTTP and `WebSocket` server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_observer_port")]
    pub port: u16,

    /// Seconds between liveness pings to each viewer.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Per-viewer backlog before a slow viewer skips ahead.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl ObserverConfig {
    /// Pull the ping interval and channel capacity into their supported
    /// ranges.
    pub fn clamp_ranges(&mut self) {
        self.ping_interval_secs = self
            .ping_interval_secs
            .clamp(MIN_PING_INTERVAL_SECS, MAX_PING_INTERVAL_SECS);
        self.broadcast_capacity = self.broadcast_capacity.clamp(1, MAX_BROADCAST_CAPACITY);
    }

    /// The ping interval as a [`Duration`].
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_observer_port(),
            ping_interval_secs: default_ping_interval_secs(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_subject() -> String {
    "doorTrigger".to_owned()
}

fn default_database_url() -> String {
    "sqlite://data/readings.db?mode=rwc".to_owned()
}

const fn default_max_connections() -> u32 {
    4
}

const fn default_write_timeout_ms() -> u64 {
    5000
}

const fn default_heartbeat_minutes() -> i64 {
    DEFAULT_HEARTBEAT_MINUTES
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    2095
}

const fn default_ping_interval_secs() -> u64 {
    30
}

const fn default_broadcast_capacity() -> usize {
    DEFAULT_BROADCAST_CAPACITY
}

fn default_log_level() -> String {
    "info".to_owned()
}
