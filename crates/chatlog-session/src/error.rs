//! Errors surfaced by the session log, session protocol and agent
//! orchestrator.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("source session not found: {0}")]
    SourceNotFound(Uuid),

    #[error("agent invocation failed: {0}")]
    UpstreamFailed(String),

    #[error("generation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] chatlog_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Ingest(#[from] chatlog_ingest::IngestError),
}

pub type SessionResult<T> = Result<T, SessionError>;
