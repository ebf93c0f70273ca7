//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur during server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Maximum connections reached.
    #[error("maximum connections reached: {0}")]
    MaxConnectionsReached(usize),

    /// A client sent more than a buffer's worth of data without a newline.
    #[error("line of {len} bytes exceeds the {max}-byte read buffer")]
    LineTooLong { len: usize, max: usize },

    /// A client stopped reading and its unsent output grew past the limit.
    #[error("{pending} bytes of unsent output exceed the {max}-byte limit")]
    OutputOverflow { pending: usize, max: usize },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Installing the shutdown signal handler failed.
    #[error("signal handler error: {0}")]
    Signal(String),
}

impl ServerError {
    /// Returns true if the error only affects a single connection.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            Self::LineTooLong { .. } | Self::OutputOverflow { .. } | Self::MaxConnectionsReached(_)
        )
    }
}
