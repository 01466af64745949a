//! Configuration for swarm documents
//!
//! Settings come from defaults, a TOML file, or `SWARMSYNC_*` environment
//! variables. Every loader validates before returning.

use crate::core_acl::DEFAULT_IDENTITY_CACHE_CAPACITY;
use crate::core_keys::DEFAULT_KEY_CACHE_CAPACITY;
use crate::core_sync::DEFAULT_MAX_DOCUMENT_ID_LEN;
use crate::logging::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

mod error;

pub use error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub keychain: KeychainConfig,
    pub acl: AclConfig,
    pub document: DocumentConfig,
    pub logging: LoggingConfig,
}

/// Keychain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeychainConfig {
    /// Materialized keys kept in the LRU cache
    pub key_cache_capacity: usize,
}

/// ACL settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Parsed identities kept by `users()`
    pub identity_cache_capacity: usize,
}

/// Document settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub max_document_id_len: usize,

    /// Buffered change notifications per subscriber
    pub event_capacity: usize,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self { key_cache_capacity: DEFAULT_KEY_CACHE_CAPACITY }
    }
}

impl Default for AclConfig {
    fn default() -> Self {
        Self { identity_cache_capacity: DEFAULT_IDENTITY_CACHE_CAPACITY }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { max_document_id_len: DEFAULT_MAX_DOCUMENT_ID_LEN, event_capacity: 100 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info.as_str().to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Settings for `init_logging_with_config`
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = LogLevel::from_str(&self.level)
            .ok_or_else(|| ConfigError::ValidationFailed(format!("Invalid log level: {}", self.level)))?;
        Ok(LogConfig::new(level)
            .with_timestamp(self.with_timestamp)
            .with_target(self.with_target)
            .json_format(self.json_format))
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl SyncConfig {
    /// Load configuration from the process environment
    ///
    /// Variables follow the pattern `SWARMSYNC_<SECTION>_<KEY>`, for example
    /// `SWARMSYNC_KEYCHAIN_KEY_CACHE_CAPACITY=128`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        const CACHE: &str = "SWARMSYNC_KEYCHAIN_KEY_CACHE_CAPACITY";
        if let Some(raw) = lookup(CACHE) {
            config.keychain.key_cache_capacity = parse_var(CACHE, &raw)?;
        }

        const IDENTITIES: &str = "SWARMSYNC_ACL_IDENTITY_CACHE_CAPACITY";
        if let Some(raw) = lookup(IDENTITIES) {
            config.acl.identity_cache_capacity = parse_var(IDENTITIES, &raw)?;
        }

        const ID_LEN: &str = "SWARMSYNC_DOCUMENT_MAX_ID_LEN";
        if let Some(raw) = lookup(ID_LEN) {
            config.document.max_document_id_len = parse_var(ID_LEN, &raw)?;
        }

        const EVENTS: &str = "SWARMSYNC_DOCUMENT_EVENT_CAPACITY";
        if let Some(raw) = lookup(EVENTS) {
            config.document.event_capacity = parse_var(EVENTS, &raw)?;
        }

        if let Some(level) = lookup("SWARMSYNC_LOG_LEVEL") {
            config.logging.level = level.trim().to_ascii_lowercase();
        }

        const JSON: &str = "SWARMSYNC_LOG_JSON";
        if let Some(raw) = lookup(JSON) {
            config.logging.json_format = parse_var(JSON, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keychain.key_cache_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "key_cache_capacity must be greater than 0".to_string(),
            ));
        }

        if self.acl.identity_cache_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "identity_cache_capacity must be greater than 0".to_string(),
            ));
        }

        if self.document.max_document_id_len == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_document_id_len must be greater than 0".to_string(),
            ));
        }

        // tokio broadcast channels panic on zero capacity
        if self.document.event_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        self.logging.to_log_config()?;
        Ok(())
    }
}
