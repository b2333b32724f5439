//! Error types for the stream store adapter.

use thiserror::Error;

/// Errors a [`crate::StreamStore`] implementation can surface.
///
/// The `Retryable` / `Fatal` split mirrors spec §4.1: callers (the
/// ingestion pipeline, the session log) retry `Retryable` errors with
/// backoff and treat `Fatal` as an immediate abort.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient I/O failure; the caller should retry with backoff.
    #[error("retryable store error: {0}")]
    Retryable(String),

    /// Non-transient failure; the caller should abort.
    #[error("fatal store error: {0}")]
    Fatal(String),

    /// The referenced session log does not exist.
    #[error("session log not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::DatabaseBusy
                    || sqlite_err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Retryable(err.to_string())
            }
            other => StoreError::Fatal(other.to_string()),
        }
    }
}
