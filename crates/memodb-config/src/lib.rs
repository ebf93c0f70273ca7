//! Configuration management for MemoDB
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (`MEMODB_*`, sections separated by `__`)
//! 3. memodb.local.toml (local overrides)
//! 4. memodb.toml (project config)
//! 5. ~/.config/memodb/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Smallest read or write buffer the server accepts.
pub const MIN_BUFFER_SIZE: usize = 4096;

/// Main MemoDB configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemodbConfig {
    pub server: ServerSection,
    pub limits: LimitsSection,
}

/// Listener and connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_address: String,
    pub max_connections: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Upper bound on one poll wait; housekeeping runs at least this often.
    pub poll_interval_ms: u64,
    /// Seconds of silence before a client is disconnected; 0 disables.
    pub idle_timeout_secs: u64,
    /// Welcome banner and `> ` prompt for telnet sessions.
    pub interactive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:12049".to_string(),
            max_connections: 1024,
            read_buffer_size: MIN_BUFFER_SIZE,
            write_buffer_size: MIN_BUFFER_SIZE,
            poll_interval_ms: 1000,
            idle_timeout_secs: 0,
            interactive: false,
        }
    }
}

/// Size limits for paths, keys and values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_path_len: usize,
    pub max_key_len: usize,
    pub max_value_len: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_path_len: 255,
            max_key_len: 127,
            max_value_len: 1024,
        }
    }
}

impl MemodbConfig {
    /// Load configuration from current directory
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parses a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind_address.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "server.bind_address '{}' is not a socket address: {e}",
                self.server.bind_address
            ))
        })
    }

    /// Checks values that would prevent the server from starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let server = &self.server;
        if server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        if server.read_buffer_size < MIN_BUFFER_SIZE || server.write_buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "server buffers must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        if server.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.poll_interval_ms must be positive".to_string(),
            ));
        }

        let limits = &self.limits;
        for (name, value) in [
            ("max_path_len", limits.max_path_len),
            ("max_key_len", limits.max_key_len),
            ("max_value_len", limits.max_value_len),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "limits.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}
