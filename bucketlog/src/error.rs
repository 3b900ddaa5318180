//! Error types for bucketlog operations.

use common::StorageError;

/// Error type for ingestion and query operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connection-level failures on either transport.
    Transport(String),
    /// Malformed text or missing fields.
    Decode(String),
    /// Invalid query parameters, such as an unknown bucket.
    InvalidInput(String),
    /// Storage backend unreachable or failing.
    Storage(String),
    /// Internal errors.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Decode(format!("invalid UTF-8: {}", err))
    }
}

/// Result type alias for bucketlog operations.
pub type Result<T> = std::result::Result<T, Error>;
