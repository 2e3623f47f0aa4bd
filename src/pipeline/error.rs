use thiserror::Error;

use crate::pipeline::controller::PipelineState;
use crate::source::error::SourceError;

/// Pipeline lifecycle errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame source failed to start: {0}")]
    SourceStart(#[from] SourceError),

    #[error("cannot {operation} a pipeline that is {state}")]
    InvalidState {
        state: PipelineState,
        operation: &'static str,
    },

    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
