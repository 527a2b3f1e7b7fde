//! Configuration loading and management

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Main configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the TCP listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Membership store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Deadline for each line read from a client (default: 5 minutes)
    #[serde(default = "default_io_timeout")]
    pub read_timeout_secs: u64,

    /// Deadline for writing the peer list to a client (default: 5 minutes)
    #[serde(default = "default_io_timeout")]
    pub write_timeout_secs: u64,

    /// How long shutdown waits for open connections before closing them
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis set shared across relay processes
    Redis,
    /// Process-local set (single relay only)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Redis address as host:port
    #[serde(default = "default_store_address")]
    pub address: String,

    /// Redis password (None = no AUTH)
    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    /// Key of the membership set
    #[serde(default = "default_set_key")]
    pub set_key: String,

    /// Deadline for a single store command
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            address: default_store_address(),
            password: None,
            db: 0,
            set_key: default_set_key(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_store_address() -> String {
    "localhost:6379".to_string()
}

fn default_set_key() -> String {
    "connected_ips".to_string()
}

fn default_store_timeout() -> u64 {
    5
}

fn default_io_timeout() -> u64 {
    5 * 60 // 5 minutes
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            store: StoreConfig::default(),
            read_timeout_secs: default_io_timeout(),
            write_timeout_secs: default_io_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::info!("No config file given, using defaults");
            return Ok(Config::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            bail!("read_timeout_secs and write_timeout_secs must be greater than zero");
        }
        if self.store.timeout_secs == 0 {
            bail!("store.timeout_secs must be greater than zero");
        }
        if self.store.set_key.is_empty() {
            bail!("store.set_key must not be empty");
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
