use thiserror::Error;

/// Error taxonomy for the thread execution manager.
///
/// Variants are kinds, not transport shapes; the HTTP layer maps them onto
/// status codes. Transient backend failures surface on the event stream as
/// `error` events rather than through this type wherever a stream exists.
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ThreadError>;
