//! Subscriber-side error kinds (spec §7, applied to C5/C6/C7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode a stream row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("reconnect backoff exhausted after {0} attempts")]
    BackoffExhausted(u32),

    #[error("optimistic mutation timed out waiting for sync confirmation")]
    SyncTimeout,
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
