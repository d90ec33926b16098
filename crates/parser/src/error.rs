//! Parser error types

use thiserror::Error;

/// Errors raised while parsing message payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Payload is not valid JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParseError>;
