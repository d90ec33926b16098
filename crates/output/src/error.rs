//! Writer error types and retry classification

use thiserror::Error;

/// Errors raised on the write path.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Client or server failure from the ClickHouse driver.
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse_rs::errors::Error),

    /// A row value did not fit its destination column.
    #[error("row does not match schema: {0}")]
    BadRow(String),

    /// Destination schema could not be loaded or is unusable.
    #[error("schema error: {0}")]
    Schema(String),

    /// The writer's connections were released; shutdown is in progress.
    #[error("writer stopped")]
    Stopped,
}

impl WriteError {
    /// Connection-class failures are worth a reconnect and retry; everything
    /// else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            WriteError::ClickHouse(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("connection refused") || msg.contains("bad connection")
            }
            WriteError::BadRow(_) | WriteError::Schema(_) | WriteError::Stopped => false,
        }
    }
}

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, WriteError>;
