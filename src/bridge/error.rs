use thiserror::Error;

/// Errors from the processing bridge and the filters behind it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("no filter connected: {0}")]
    Unavailable(String),
    #[error("failed to load filter library: {0}")]
    Load(String),
    #[error("filter library is missing symbol `{0}`")]
    MissingSymbol(String),
    #[error("filter info query failed: {0}")]
    Info(String),
    #[error("filter rejected the frame with code {code}")]
    Rejected { code: i32 },
    #[error("filter panicked: {0}")]
    Panicked(String),
    #[error("filter returned an unusable frame: {0}")]
    InvalidOutput(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, FilterError>;
