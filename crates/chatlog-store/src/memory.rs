//! In-process `StreamStore` backed by a `Vec` per session key plus a
//! bounded broadcast channel for live delivery.
//!
//! Grounded on `EventFanout` (bounded `broadcast::channel`,
//! subscribe-before-publish semantics) with durable storage folded in.

use crate::error::{StoreError, StoreResult};
use crate::offset::Offset;
use crate::store::{ReadBatch, ReadMode, StoredRow, StreamStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const LIVE_BUFFER: usize = 1024;

struct Log {
    rows: Vec<StoredRow>,
    sender: broadcast::Sender<StoredRow>,
}

impl Log {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(LIVE_BUFFER);
        Self {
            rows: Vec::new(),
            sender,
        }
    }
}

/// In-memory stream store for tests and single-process embedding.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    logs: Arc<Mutex<HashMap<String, Log>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamStore for InMemoryStore {
    async fn create(&self, session_key: &str) -> StoreResult<()> {
        self.logs
            .lock()
            .entry(session_key.to_string())
            .or_insert_with(Log::new);
        Ok(())
    }

    async fn append(&self, session_key: &str, bytes: Vec<u8>) -> StoreResult<Offset> {
        let mut logs = self.logs.lock();
        let log = logs
            .entry(session_key.to_string())
            .or_insert_with(Log::new);
        let offset = Offset::new(log.rows.len() as u64);
        let row = StoredRow { offset, bytes };
        log.rows.push(row.clone());
        // A live subscriber dropping its receiver is not an error for the
        // writer — there may simply be nobody tailing right now.
        let _ = log.sender.send(row);
        Ok(offset)
    }

    async fn read(
        &self,
        session_key: &str,
        from_offset: Option<Offset>,
        _mode: ReadMode,
    ) -> StoreResult<ReadBatch> {
        let logs = self.logs.lock();
        let log = logs
            .get(session_key)
            .ok_or_else(|| StoreError::NotFound(session_key.to_string()))?;

        let start = from_offset.map(|o| o.as_u64()).unwrap_or(0) as usize;
        let rows: Vec<StoredRow> = log.rows.iter().skip(start).cloned().collect();
        let next_offset = Offset::new(log.rows.len() as u64);

        Ok(ReadBatch {
            rows,
            next_offset,
            up_to_date: true,
        })
    }

    fn subscribe(&self, session_key: &str) -> broadcast::Receiver<StoredRow> {
        let mut logs = self.logs.lock();
        let log = logs
            .entry(session_key.to_string())
            .or_insert_with(Log::new);
        log.sender.subscribe()
    }

    async fn delete(&self, session_key: &str) -> StoreResult<()> {
        self.logs.lock().remove(session_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = InMemoryStore::new();
        store.create("s1").await.unwrap();
        store.create("s1").await.unwrap();
        let batch = store.read("s1", None, ReadMode::Catchup).await.unwrap();
        assert!(batch.rows.is_empty());
        assert!(batch.up_to_date);
    }

    #[tokio::test]
    async fn append_assigns_increasing_offsets() {
        let store = InMemoryStore::new();
        let o1 = store.append("s1", b"a".to_vec()).await.unwrap();
        let o2 = store.append("s1", b"b".to_vec()).await.unwrap();
        assert!(o1 < o2);
    }

    #[tokio::test]
    async fn read_from_offset_is_inclusive_of_that_offset() {
        let store = InMemoryStore::new();
        store.append("s1", b"a".to_vec()).await.unwrap();
        let o2 = store.append("s1", b"b".to_vec()).await.unwrap();

        let batch = store.read("s1", Some(o2), ReadMode::Catchup).await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].bytes, b"b");
    }

    #[tokio::test]
    async fn resuming_from_a_prior_batchs_next_offset_does_not_skip_the_row_that_arrives_at_it() {
        let store = InMemoryStore::new();
        store.append("s1", b"a".to_vec()).await.unwrap();
        store.append("s1", b"b".to_vec()).await.unwrap();

        let first = store.read("s1", None, ReadMode::Catchup).await.unwrap();
        assert_eq!(first.next_offset, Offset::new(2));

        store.append("s1", b"c".to_vec()).await.unwrap();

        let second = store.read("s1", Some(first.next_offset), ReadMode::Catchup).await.unwrap();
        assert_eq!(second.rows.len(), 1);
        assert_eq!(second.rows[0].bytes, b"c");
    }

    #[tokio::test]
    async fn read_on_empty_session_from_start_returns_nothing_and_up_to_date() {
        let store = InMemoryStore::new();
        store.create("empty").await.unwrap();
        let batch = store
            .read("empty", None, ReadMode::Catchup)
            .await
            .unwrap();
        assert!(batch.rows.is_empty());
        assert!(batch.up_to_date);
    }

    #[tokio::test]
    async fn read_on_unknown_session_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.read("missing", None, ReadMode::Catchup).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn subscribe_receives_only_future_appends() {
        let store = InMemoryStore::new();
        store.append("s1", b"before".to_vec()).await.unwrap();

        let mut rx = store.subscribe("s1");
        store.append("s1", b"after".to_vec()).await.unwrap();

        let row = rx.recv().await.unwrap();
        assert_eq!(row.bytes, b"after");
    }

    #[tokio::test]
    async fn delete_removes_all_data() {
        let store = InMemoryStore::new();
        store.append("s1", b"a".to_vec()).await.unwrap();
        store.delete("s1").await.unwrap();
        let err = store.read("s1", None, ReadMode::Catchup).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }
}
