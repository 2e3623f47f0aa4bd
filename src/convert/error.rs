use thiserror::Error;

use crate::source::types::Dimensions;

/// Pixel-format conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("frame has no pixels ({0})")]
    Empty(Dimensions),
    #[error("plane {plane} row stride {stride} is narrower than {width} samples")]
    StrideTooSmall {
        plane: usize,
        stride: usize,
        width: usize,
    },
    #[error("plane {plane} holds {actual} bytes, geometry needs {required}")]
    PlaneTooSmall {
        plane: usize,
        required: usize,
        actual: usize,
    },
    #[error("packed buffer of {actual} bytes does not match {dims} RGBA ({expected} bytes)")]
    BufferSize {
        dims: Dimensions,
        expected: usize,
        actual: usize,
    },
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ConvertError>;
