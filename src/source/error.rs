use thiserror::Error;

/// Frame source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("capture session failed to start: {0}")]
    StartFailed(String),

    #[error("source already started")]
    AlreadyStarted,

    #[error("format negotiation failed: {0}")]
    Format(String),

    #[error("frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("capture session failed: {0}")]
    SessionLost(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, SourceError>;
