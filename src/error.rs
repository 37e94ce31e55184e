/// Error types for Mobility Explorer operations.
///
/// Every read operation that can legitimately match nothing reports that
/// absence as [`ExplorerError::NotFound`] rather than an empty payload; the
/// list endpoint is the single exception and returns an empty page instead.
/// Input that is malformed or out of range is rejected as
/// [`ExplorerError::Validation`] before any query is built.
use thiserror::Error;

/// The main error type for Mobility Explorer operations.
///
/// All fallible operations return `Result<T, ExplorerError>`.
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Malformed or out-of-range request input (e.g. `limit > 1000`)
    #[error("Validation error: {reason}")]
    Validation {
        /// Description of what was rejected
        reason: String,
    },

    /// A well-formed query matched zero records
    #[error("{0}")]
    NotFound(String),

    /// The record store failed or was unavailable
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of the offending setting
        reason: String,
    },
}

impl ExplorerError {
    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Whether this error was caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound(_))
    }
}

impl From<rusqlite::Error> for ExplorerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExplorerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Store(format!("store task failed: {}", err))
    }
}

/// Result type alias for Mobility Explorer operations.
pub type ExplorerResult<T> = Result<T, ExplorerError>;
