//! The `StreamStore` capability (C1): append, read-range, live-tail over an
//! ordered byte log per session key.

use crate::error::StoreResult;
use crate::offset::Offset;
use async_trait::async_trait;

/// How a [`StreamStore::read`] call should behave once the backlog is
/// drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Return whatever is available right now and stop.
    Catchup,
    /// Block (up to an implementation-defined timeout) for new rows once
    /// caught up.
    LiveLongPoll,
    /// Stream new rows as they are appended, without an upper bound.
    LiveSse,
}

/// One row as stored: the append-assigned offset plus the raw bytes handed
/// to `append`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub offset: Offset,
    pub bytes: Vec<u8>,
}

/// The result of a [`StreamStore::read`] call.
#[derive(Debug, Clone)]
pub struct ReadBatch {
    pub rows: Vec<StoredRow>,
    /// The offset a subsequent read should resume from: one past the last
    /// row actually returned, or the unchanged `from_offset` cursor when
    /// no rows were returned.
    pub next_offset: Offset,
    /// True once the backlog as of the call has been fully drained.
    pub up_to_date: bool,
}

/// Abstract capability the durable chat session backbone depends on
/// (spec §4.1). Implementations must guarantee:
///
/// - `create` is idempotent: creating an existing log is a no-op.
/// - `append` is atomic and returns the assigned offset.
/// - append ordering equals read ordering; reads survive writer crashes.
/// - live mode publishes newly appended records to all subscribers with
///   bounded latency.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Idempotently create (or no-op if it exists) the log for a session key.
    async fn create(&self, session_key: &str) -> StoreResult<()>;

    /// Atomically append `bytes` to the session's log, returning the
    /// offset the store assigned.
    async fn append(&self, session_key: &str, bytes: Vec<u8>) -> StoreResult<Offset>;

    /// Read a batch of rows starting at (and including) `from_offset` —
    /// the same cursor a prior call's `ReadBatch::next_offset` returned.
    /// `None` reads from the start of the log.
    async fn read(
        &self,
        session_key: &str,
        from_offset: Option<Offset>,
        mode: ReadMode,
    ) -> StoreResult<ReadBatch>;

    /// Subscribe to live appends on this session key, receiving every row
    /// appended after the call (no backlog).
    fn subscribe(&self, session_key: &str) -> tokio::sync::broadcast::Receiver<StoredRow>;

    /// Remove the log and all of its data.
    async fn delete(&self, session_key: &str) -> StoreResult<()>;
}
