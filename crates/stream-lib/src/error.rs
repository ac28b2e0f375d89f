//! Error types shared across the pipeline

use thiserror::Error;

/// Errors raised by pipeline construction and the built-in collaborators
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("stream source error: {0}")]
    Source(String),

    #[error("{role} worker failed: {message}")]
    WorkerFailed { role: &'static str, message: String },

    #[error("no weights have been published")]
    WeightsUnavailable,
}

impl PipelineError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
