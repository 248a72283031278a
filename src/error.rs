//! Error types for the notice board.

use thiserror::Error;

/// Common error type for infrastructure-level failures.
///
/// Remote feed problems are not represented here; they are normalized into
/// [`crate::rss::FetchFailure`] and recorded against the feed instead.
#[derive(Error, Debug)]
pub enum NoticeboardError {
    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for operator input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Background task error (panicked or cancelled worker).
    #[error("task error: {0}")]
    Task(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for NoticeboardError {
    fn from(e: sqlx::Error) -> Self {
        NoticeboardError::Database(e.to_string())
    }
}

/// Result type alias for notice board operations.
pub type Result<T> = std::result::Result<T, NoticeboardError>;
