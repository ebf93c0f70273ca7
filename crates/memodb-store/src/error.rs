//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while resolving paths or manipulating entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A path segment does not exist and the operation does not create paths.
    #[error("file '{path}' does not exist")]
    PathNotFound { path: String },

    /// The node exists but holds no entry with this key.
    #[error("key '{key}' not found in file '{path}'")]
    KeyNotFound { path: String, key: String },

    /// The path contains an empty or over-long segment.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The key is empty, over-long, or contains a `/`.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// The value exceeds the configured maximum size.
    #[error("value of {len} bytes exceeds the {max}-byte limit")]
    ValueTooLarge { len: usize, max: usize },

    /// An allocation failed.
    #[error("out of memory while {0}")]
    OutOfMemory(&'static str),
}

impl StoreError {
    /// Returns true if the path or the key is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. } | Self::KeyNotFound { .. })
    }

    /// Returns true if the request itself was malformed.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. } | Self::InvalidKey { .. } | Self::ValueTooLarge { .. }
        )
    }
}
