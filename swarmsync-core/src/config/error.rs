//! Errors raised while loading, saving or validating a `SyncConfig`

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written
    #[error("Config file {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    /// The file is not TOML that maps onto `SyncConfig`
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not render config as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// A `SWARMSYNC_*` variable did not parse as the expected type
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// A setting is out of range
    #[error("Invalid setting: {0}")]
    ValidationFailed(String),
}
