//! Session log (C2): presents one logical session stream backed by C1,
//! owning per-message seq allocation.

use crate::chunk::{session_key, Chunk, ChunkPayload, MessageId, Role, SessionId};
use crate::error::SessionResult;
use chatlog_store::{Offset, ReadMode, StoredRow, StreamStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::sync::broadcast;

/// Presents a single logical session stream. Per-message seq counters are
/// owned here, not in the store (spec §4.2): they are in-process state,
/// rebuilt from the log tail the first time a `messageId` is referenced
/// after process start.
pub struct SessionLog {
    store: Arc<dyn StreamStore>,
    seq_counters: Mutex<HashMap<MessageId, u64>>,
    /// Tracks which message a tool call / approval belongs to, so
    /// `tool-result` and `approval-response` can resolve an omitted
    /// `messageId` (spec §4.4 marks both as optional).
    tool_call_owners: StdMutex<HashMap<String, MessageId>>,
    approval_owners: StdMutex<HashMap<String, MessageId>>,
}

impl SessionLog {
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self {
            store,
            seq_counters: Mutex::new(HashMap::new()),
            tool_call_owners: StdMutex::new(HashMap::new()),
            approval_owners: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn open(&self, session_id: SessionId) -> SessionResult<()> {
        self.store.create(&session_key(session_id)).await?;
        Ok(())
    }

    /// Append a chunk with the next seq for `message_id`, delegating the
    /// offset assignment to C1.
    pub async fn append(
        &self,
        session_id: SessionId,
        message_id: MessageId,
        actor_id: &str,
        role: Role,
        payload: ChunkPayload,
    ) -> SessionResult<Chunk> {
        let seq = self.next_seq(session_id, message_id).await?;
        self.track_owners(message_id, &payload);

        let mut chunk = Chunk {
            session_id,
            message_id,
            seq,
            actor_id: actor_id.to_string(),
            role,
            payload,
            created_at: time::OffsetDateTime::now_utc(),
            offset: None,
        };

        let bytes = serde_json::to_vec(&chunk)?;
        let offset = self.store.append(&session_key(session_id), bytes).await?;
        chunk.offset = Some(offset);

        if chunk.is_terminal() {
            self.seq_counters.lock().await.remove(&message_id);
        }

        Ok(chunk)
    }

    /// Append a terminal chunk (`done` / `stop` / `error`). A thin wrapper
    /// over `append` that documents the call site's intent; the terminal
    /// detection and seq-counter clearing happen in `append` regardless.
    pub async fn terminal(
        &self,
        session_id: SessionId,
        message_id: MessageId,
        actor_id: &str,
        role: Role,
        payload: ChunkPayload,
    ) -> SessionResult<Chunk> {
        debug_assert!(payload.is_terminal());
        self.append(session_id, message_id, actor_id, role, payload).await
    }

    pub async fn read(
        &self,
        session_id: SessionId,
        from_offset: Option<Offset>,
        mode: ReadMode,
    ) -> SessionResult<chatlog_store::ReadBatch> {
        Ok(self.store.read(&session_key(session_id), from_offset, mode).await?)
    }

    pub fn subscribe(&self, session_id: SessionId) -> broadcast::Receiver<StoredRow> {
        self.store.subscribe(&session_key(session_id))
    }

    pub async fn delete(&self, session_id: SessionId) -> SessionResult<()> {
        Ok(self.store.delete(&session_key(session_id)).await?)
    }

    pub fn resolve_tool_call_owner(&self, tool_call_id: &str) -> Option<MessageId> {
        self.tool_call_owners.lock().unwrap().get(tool_call_id).copied()
    }

    pub fn resolve_approval_owner(&self, approval_id: &str) -> Option<MessageId> {
        self.approval_owners.lock().unwrap().get(approval_id).copied()
    }

    async fn next_seq(&self, session_id: SessionId, message_id: MessageId) -> SessionResult<u64> {
        let mut counters = self.seq_counters.lock().await;
        if let Some(seq) = counters.get(&message_id) {
            let next = *seq;
            counters.insert(message_id, next + 1);
            return Ok(next);
        }
        drop(counters);

        let recovered = self.recover_next_seq(session_id, message_id).await?;
        self.seq_counters.lock().await.insert(message_id, recovered + 1);
        Ok(recovered)
    }

    /// Rebuild the seq counter for `message_id` by scanning the log tail
    /// (spec §4.2: "the counter is rebuilt by reading the log tail for
    /// that messageId on recovery").
    async fn recover_next_seq(&self, session_id: SessionId, message_id: MessageId) -> SessionResult<u64> {
        let batch = self.store.read(&session_key(session_id), None, ReadMode::Catchup).await?;
        let mut highest_seen: Option<u64> = None;
        for row in batch.rows {
            if let Ok(chunk) = serde_json::from_slice::<Chunk>(&row.bytes) {
                if chunk.message_id == message_id {
                    highest_seen = Some(chunk.seq);
                }
            }
        }
        Ok(highest_seen.map(|s| s + 1).unwrap_or(0))
    }

    fn track_owners(&self, message_id: MessageId, payload: &ChunkPayload) {
        match payload {
            ChunkPayload::ToolCall { tool_call } => {
                self.tool_call_owners
                    .lock()
                    .unwrap()
                    .insert(tool_call.id.clone(), message_id);
            }
            ChunkPayload::ApprovalRequested { approval, .. } => {
                self.approval_owners
                    .lock()
                    .unwrap()
                    .insert(approval.id.clone(), message_id);
            }
            _ => {}
        }
    }
}
