//! Errors surfaced by the ingestion pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The upstream byte stream itself failed (network flake, non-2xx).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The chunk sink (session log) rejected an append.
    #[error("sink error: {0}")]
    Sink(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
