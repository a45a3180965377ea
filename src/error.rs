//! Error types for devnews.

use thiserror::Error;

/// Common error type for devnews.
#[derive(Error, Debug)]
pub enum DevNewsError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant with their message.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for input or configuration values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// News source (provider or transport) error.
    #[error("source error: {0}")]
    Source(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for DevNewsError {
    fn from(e: sqlx::Error) -> Self {
        DevNewsError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for DevNewsError {
    fn from(e: reqwest::Error) -> Self {
        DevNewsError::Source(e.to_string())
    }
}

/// Result type alias for devnews operations.
pub type Result<T> = std::result::Result<T, DevNewsError>;
