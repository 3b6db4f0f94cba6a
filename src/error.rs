// src/error.rs

//! Error types for the gradebase library

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gradebase operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Initialization failed
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Semantic validation failed; the message is user-directed
    #[error("{0}")]
    ValidationError(String),

    /// An identification reply contradicts the request or the local store
    #[error("Reply inconsistent with request: {0}")]
    ReplyInconsistent(String),

    /// A stored record holds a value no code path can have written
    #[error("Record store corrupt: {0}")]
    StoreCorrupt(String),

    /// HTTP transport failure, surfaced verbatim
    #[error("Exception raised trying to open or read URL: {0}")]
    DownloadError(String),

    /// More than one federation code matched a membership number
    #[error("Too many codes for membership number {0}")]
    TooManyCodes(String),

    /// Configuration file could not be read or written
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Background task was cancelled; the transaction was rolled back
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}
