//! Pipeline error types

use thiserror::Error;

use silt_input::InputError;
use silt_model::SinkError;

/// Errors raised by the task supervisor.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Destination writer failure during init or schema change.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Input driver failure during init or stop.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Operation attempted in the wrong lifecycle state.
    #[error("task is {0}")]
    BadState(&'static str),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
