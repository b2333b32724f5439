//! Optimistic mutation layer (C7, spec §4.7): a subscriber-local insert
//! lives in the raw chunk view immediately, then is reconciled (offset
//! patched in place, no flicker) or rolled back (removed entirely) once
//! the server call resolves.
//!
//! Grounded on the request/await-event pattern in
//! `ui/handlers/session_ops.rs` — issue an operation, then wait for the
//! event it produces before updating UI-visible state — narrowed here to
//! a single awaited key match instead of a whole event-kind dispatch.

use crate::error::{ClientError, ClientResult};
use crate::projection::ProjectionEngine;
use crate::wire::SubscriberRow;
use chatlog_session::MessageId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// Default timeout for an awaited sync confirmation (spec §5 "≈30 s").
pub const SYNC_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingInsert {
    notify: Option<oneshot::Sender<bool>>,
}

/// Tracks subscriber-local inserts awaiting server confirmation, keyed by
/// the same `(messageId, seq)` the synced row will eventually carry.
#[derive(Default)]
pub struct OptimisticBuffer {
    pending: HashMap<(MessageId, u64), PendingInsert>,
}

impl OptimisticBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 1-2: writes `row` into the raw chunk view right away and
    /// registers it as awaiting confirmation. Returns a receiver that
    /// resolves to `true` on reconciliation, `false` on rollback.
    pub fn insert(&mut self, engine: &mut ProjectionEngine, row: SubscriberRow) -> oneshot::Receiver<bool> {
        let (notify, receiver) = oneshot::channel();
        let key = (row.message_id, row.seq);
        engine.apply(&row);
        self.pending.insert(key, PendingInsert { notify: Some(notify) });
        receiver
    }

    /// Step 3-4: call this for every row the subscriber sync loop
    /// delivers, confirmed or not. If it matches a pending optimistic
    /// insert (by key, not content — spec §4.7), the message's sort
    /// offset is patched to the real one and the waiter resolves `true`.
    /// The row itself is never re-applied: the shared dedup key set
    /// already makes that a no-op, so content never double-applies.
    pub fn observe(&mut self, engine: &mut ProjectionEngine, row: &SubscriberRow) -> bool {
        let key = (row.message_id, row.seq);
        match self.pending.remove(&key) {
            Some(mut pending) => {
                engine.reconcile_offset(row.message_id, row.offset);
                if let Some(notify) = pending.notify.take() {
                    let _ = notify.send(true);
                }
                true
            }
            None => false,
        }
    }

    /// Step 5: the server call failed; remove the optimistic row from
    /// the raw chunk view entirely and resolve the waiter with `false`.
    pub fn rollback(&mut self, engine: &mut ProjectionEngine, message_id: MessageId, seq: u64) {
        if let Some(mut pending) = self.pending.remove(&(message_id, seq)) {
            engine.rollback_message(message_id);
            if let Some(notify) = pending.notify.take() {
                let _ = notify.send(false);
            }
        }
    }

    pub fn is_pending(&self, message_id: MessageId, seq: u64) -> bool {
        self.pending.contains_key(&(message_id, seq))
    }
}

/// Awaits a confirmation receiver returned by [`OptimisticBuffer::insert`],
/// applying the default timeout from spec §5. Expiry is itself a rollback
/// trigger for the caller: the optimistic row is not removed here (the
/// caller does not hold the buffer across the `.await`), so callers must
/// follow a timeout with `OptimisticBuffer::rollback`.
pub async fn await_confirmation(receiver: oneshot::Receiver<bool>) -> ClientResult<()> {
    match tokio::time::timeout(SYNC_CONFIRMATION_TIMEOUT, receiver).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(ClientError::Transport("optimistic insert rolled back".to_string())),
        Ok(Err(_)) => Err(ClientError::Transport("optimistic buffer dropped before resolving".to_string())),
        Err(_) => Err(ClientError::SyncTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlog_session::{ChunkPayload, EmbeddedMessage, MessagePart, Role};
    use chatlog_store::Offset;
    use uuid::Uuid;

    fn whole_message_row(message_id: MessageId, offset: u64, content: &str) -> SubscriberRow {
        SubscriberRow {
            offset: Offset::new(offset),
            message_id,
            actor_id: "user-1".into(),
            role: Role::User,
            payload: ChunkPayload::WholeMessage {
                message: EmbeddedMessage {
                    id: message_id,
                    role: Role::User,
                    parts: vec![MessagePart::Text { content: content.to_string() }],
                    created_at: time::OffsetDateTime::now_utc(),
                },
            },
            seq: 0,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn reconciliation_patches_offset_and_resolves_confirmation() {
        let mut engine = ProjectionEngine::new();
        let mut buffer = OptimisticBuffer::new();
        let u1 = Uuid::new_v4();

        let optimistic_row = whole_message_row(u1, 0, "Hello");
        let confirmation = buffer.insert(&mut engine, optimistic_row);
        assert_eq!(engine.messages().len(), 1);
        assert!(buffer.is_pending(u1, 0));

        // The server assigns a different real offset for the same key.
        let synced_row = whole_message_row(u1, 42, "Hello");
        let reconciled = buffer.observe(&mut engine, &synced_row);
        assert!(reconciled);
        assert!(!buffer.is_pending(u1, 0));

        await_confirmation(confirmation).await.unwrap();
        assert_eq!(engine.messages()[0].started_at, Offset::new(42));
    }

    #[tokio::test]
    async fn rollback_removes_the_optimistic_message_entirely() {
        let mut engine = ProjectionEngine::new();
        let mut buffer = OptimisticBuffer::new();
        let u1 = Uuid::new_v4();

        let optimistic_row = whole_message_row(u1, 0, "Hello");
        let confirmation = buffer.insert(&mut engine, optimistic_row);
        assert_eq!(engine.messages().len(), 1);

        buffer.rollback(&mut engine, u1, 0);
        assert!(engine.messages().is_empty());
        assert!(await_confirmation(confirmation).await.is_err());
    }

    /// Scenario 6: client optimistically inserts U1; server syncs U1 and
    /// the first assistant chunk A1:0 in the same batch. After resolving,
    /// the messages view contains both, with the placeholder gone.
    #[tokio::test]
    async fn optimistic_insert_survives_alongside_a_racing_assistant_chunk() {
        let mut engine = ProjectionEngine::new();
        let mut buffer = OptimisticBuffer::new();
        let u1 = Uuid::new_v4();
        let a1 = Uuid::new_v4();

        let optimistic_row = whole_message_row(u1, 0, "Hello");
        let confirmation = buffer.insert(&mut engine, optimistic_row);

        let synced_u1 = whole_message_row(u1, 10, "Hello");
        buffer.observe(&mut engine, &synced_u1);
        let synced_a1 = SubscriberRow {
            offset: Offset::new(11),
            message_id: a1,
            actor_id: "agent-1".into(),
            role: Role::Assistant,
            payload: ChunkPayload::Content { delta: Some("Hi".into()), content: None, role: None },
            seq: 0,
            created_at: "2026-01-01T00:00:01Z".into(),
        };
        engine.apply(&synced_a1);

        await_confirmation(confirmation).await.unwrap();
        let messages = engine.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, u1);
        assert_eq!(messages[1].id, a1);
    }
}
