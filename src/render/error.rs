use thiserror::Error;

/// Frame presentation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),
    #[error("GPU device error: {0}")]
    Device(String),
    #[error("frame cannot be presented: {0}")]
    InvalidFrame(String),
    #[error("image encoding failed: {0}")]
    Encode(String),
    #[error("failed to write output: {0}")]
    Io(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, RenderError>;
