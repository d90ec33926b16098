//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config file {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type error.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Semantically invalid configuration.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
