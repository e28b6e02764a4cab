//! Configuration for jsonkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Main configuration for a jsonkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the documents, one file per key:
    ///   {data_dir}/
    ///     ├── profile.json
    ///     └── settings.json
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Long-Poll Configuration
    // -------------------------------------------------------------------------
    /// How long a waiter stays registered before resolving as timed out (milliseconds)
    pub long_poll_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Idle read timeout between requests on a keep-alive connection (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Largest accepted request body (bytes)
    pub max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./jsonkv_data"),
            long_poll_timeout_ms: 30_000,
            listen_addr: "127.0.0.1:10001".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            max_body_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Long-poll timeout as a Duration
    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }

    /// Idle read timeout, `None` when disabled
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.long_poll_timeout_ms == 0 {
            return Err(KvError::Config(
                "long_poll_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(KvError::Config(
                "max_body_size must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(KvError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (one file per document)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the long-poll timeout (in milliseconds)
    pub fn long_poll_timeout_ms(mut self, ms: u64) -> Self {
        self.config.long_poll_timeout_ms = ms;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the idle read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the request body limit (in bytes)
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
