use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Auth expired or rejected")]
    AuthExpired,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Addressing failures in the sender list. These are expected while the
/// cursor points at rows that a rebuild removed, so callers usually no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("offset {offset} is out of range ({visible} visible rows)")]
    OutOfRange { offset: usize, visible: usize },
    #[error("list entry no longer exists")]
    StaleId,
}
