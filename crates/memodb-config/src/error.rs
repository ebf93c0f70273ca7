//! Errors raised while locating, reading or checking MemoDB configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid MemoDB TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value the server could not start with.
    #[error("invalid setting: {0}")]
    Invalid(String),

    /// No home directory to hold `memodb/config.toml`.
    #[error("no user configuration directory on this system")]
    NoConfigDir,
}
