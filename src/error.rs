//! Error types for `todo_api`.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TodoError>;

/// Error taxonomy for the service layer.
///
/// `Validation` and `NotFound` are client errors and must stay distinct:
/// the HTTP layer maps them to 422 and 404 respectively. Everything else
/// surfaces as a server error.
#[derive(Debug, Error)]
pub enum TodoError {
    /// Bad input shape or value: blank title, malformed due date,
    /// malformed filter bound.
    #[error("{0}")]
    Validation(String),

    /// Referenced task id does not exist.
    #[error("task not found: {id}")]
    NotFound { id: i64 },

    /// Request is structurally unusable: empty bulk list, patch body with
    /// no supported fields, unsupported import mode.
    #[error("{0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TodoError {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a bad-request failure.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}
