//! Input error types

use thiserror::Error;

/// Errors raised by input drivers.
#[derive(Debug, Error)]
pub enum InputError {
    /// Kafka client failure.
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Driver used before `init` (or after `stop`).
    #[error("input not initialised")]
    NotInitialised,

    /// The session is closed; commits are dropped on purpose.
    #[error("input stopped")]
    Stopped,
}

/// Result type for input operations.
pub type Result<T> = std::result::Result<T, InputError>;
