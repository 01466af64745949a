//! Logging errors

use thiserror::Error;

/// Errors raised while setting up log output
#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed, or the filter was rejected
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// Unknown level name or unusable option
    #[error("Invalid logging configuration: {0}")]
    InvalidConfiguration(String),
}
