use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpiryError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Record '{0}' already exists")]
    DuplicateIdentity(String),

    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error("Change feed interrupted: {0}")]
    FeedInterrupted(String),

    #[error("Resume position unavailable: {0}")]
    ResumeUnavailable(String),

    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, ExpiryError>;

impl From<serde_json::Error> for ExpiryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ExpiryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExpiryError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(err.to_string())
    }
}
