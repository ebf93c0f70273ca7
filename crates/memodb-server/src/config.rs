//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use memodb_protocol::ParseLimits;
use memodb_store::StoreLimits;

use crate::error::{ServerError, ServerResult};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 12049;

/// Smallest accepted read or write buffer size.
pub const MIN_BUFFER_SIZE: usize = 4096;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
    /// Read buffer size per connection; also the longest accepted line.
    pub read_buffer_size: usize,
    /// Initial capacity of the per-connection response buffer.
    pub write_buffer_size: usize,
    /// Queued output at which a connection stops reading commands until the
    /// client catches up.
    pub output_high_water: usize,
    /// Hard ceiling on unsent output. Only a single oversized response can
    /// push a connection past the high-water mark this far.
    pub max_pending_output: usize,
    /// Upper bound on a single poll wait, so housekeeping runs regularly.
    pub poll_timeout: Duration,
    /// Close connections with no traffic for this long.
    pub idle_timeout: Option<Duration>,
    /// Send a welcome banner and a `> ` prompt after every response.
    pub interactive: bool,
    /// Path, key and value length limits.
    pub limits: ParseLimits,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum number of concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the write buffer size.
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the output level at which reading pauses.
    pub fn with_output_high_water(mut self, bytes: usize) -> Self {
        self.output_high_water = bytes;
        self
    }

    /// Sets the pending output ceiling per connection.
    pub fn with_max_pending_output(mut self, bytes: usize) -> Self {
        self.max_pending_output = bytes;
        self
    }

    /// Sets the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enables or disables interactive (telnet-friendly) mode.
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Sets the path, key and value length limits.
    pub fn with_limits(mut self, limits: ParseLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Store limits matching the protocol limits.
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits::default()
            .with_max_segment_len(self.limits.max_path_len)
            .with_max_key_len(self.limits.max_key_len)
            .with_max_value_len(self.limits.max_value_len)
    }

    /// Checks the configuration for values the server cannot run with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_connections == 0 {
            return Err(ServerError::Config(
                "max_connections must be positive".to_string(),
            ));
        }
        if self.read_buffer_size < MIN_BUFFER_SIZE || self.write_buffer_size < MIN_BUFFER_SIZE {
            return Err(ServerError::Config(format!(
                "read and write buffers must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        if self.limits.max_path_len == 0
            || self.limits.max_key_len == 0
            || self.limits.max_value_len == 0
        {
            return Err(ServerError::Config(
                "path, key and value limits must be positive".to_string(),
            ));
        }

        // "SET " + path + ' ' + key + ' ' + value + "\r\n"
        let longest_command =
            self.limits.max_path_len + self.limits.max_key_len + self.limits.max_value_len + 8;
        if longest_command > self.read_buffer_size {
            return Err(ServerError::Config(format!(
                "read buffer of {} bytes cannot hold a maximal SET command ({longest_command} bytes)",
                self.read_buffer_size
            )));
        }
        if self.max_pending_output < self.write_buffer_size {
            return Err(ServerError::Config(
                "max_pending_output must be at least write_buffer_size".to_string(),
            ));
        }
        if self.output_high_water == 0 || self.output_high_water > self.max_pending_output {
            return Err(ServerError::Config(format!(
                "output_high_water must be between 1 and max_pending_output ({} bytes)",
                self.max_pending_output
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(ServerError::Config(
                "poll_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_connections: 1024,
            read_buffer_size: MIN_BUFFER_SIZE,
            write_buffer_size: MIN_BUFFER_SIZE,
            output_high_water: 64 * 1024,
            max_pending_output: 1024 * 1024, // 1 MiB
            poll_timeout: Duration::from_secs(1),
            idle_timeout: None,
            interactive: false,
            limits: ParseLimits::default(),
        }
    }
}
