//! Error types for the notifier.

use thiserror::Error;

/// Common error type for the notifier.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Database error.
    ///
    /// Errors from sqlx are converted automatically.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A topic listing could not be retrieved or parsed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A message could not be delivered to a recipient.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A bounded operation did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The record already exists (duplicate chat, topic or subscription).
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Work was abandoned because the process is shutting down.
    #[error("shutting down")]
    Shutdown,
}

impl From<sqlx::Error> for NotifierError {
    fn from(e: sqlx::Error) -> Self {
        NotifierError::Database(e.to_string())
    }
}

impl NotifierError {
    /// Returns true for errors scoped to a single poll cycle or delivery,
    /// which are logged and retried on a later tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NotifierError::Fetch(_) | NotifierError::Delivery(_) | NotifierError::Timeout(_)
        )
    }
}

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, NotifierError>;
