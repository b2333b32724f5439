//! Subscriber sync loop (C5, spec §4.5): catch-up until `upToDate`, then
//! tail live via repeated long-poll reads, persisting `lastSyncedOffset`
//! after every batch and deduplicating by `(messageId, seq)`.
//!
//! Reconnect on transport error uses exponential backoff capped at
//! [`MAX_BACKOFF`], the same shape as the LLM rate-limit retry loop in
//! `agent/execution/llm_retry.rs`, bounded here at [`MAX_RETRIES`]
//! consecutive failures before surfacing [`ClientError::BackoffExhausted`].

use crate::error::{ClientError, ClientResult};
use crate::resume::ResumeStore;
use crate::transport::{LiveMode, StreamReader};
use crate::wire::SubscriberRow;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 8;

/// Drives one session's catch-up + live read loop, handing deduplicated
/// rows to `sink` in arrival order. Runs until `cancel` fires or the
/// backoff budget is exhausted.
pub struct SubscriberSync<T, R> {
    transport: Arc<T>,
    resume_store: Arc<R>,
    session_id: String,
    stream_url: String,
    seen: HashSet<(uuid::Uuid, u64)>,
}

impl<T, R> SubscriberSync<T, R>
where
    T: StreamReader,
    R: ResumeStore,
{
    pub fn new(transport: Arc<T>, resume_store: Arc<R>, session_id: impl Into<String>, stream_url: impl Into<String>) -> Self {
        SubscriberSync {
            transport,
            resume_store,
            session_id: session_id.into(),
            stream_url: stream_url.into(),
            seen: HashSet::new(),
        }
    }

    /// Runs until `cancel` is triggered. Cancellation is checked at every
    /// suspension point (§5 "Subscriber sync suspends on ... reconnection
    /// delay"); no further rows are delivered to `sink` once cancelled.
    pub async fn run(&mut self, cancel: CancellationToken, sink: mpsc::Sender<SubscriberRow>) -> ClientResult<()> {
        let mut from_offset = self.resume_store.last_synced_offset(&self.session_id).await;

        // Catch-up phase: keep reading until the server reports up_to_date.
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let batch = self.transport.read(&self.stream_url, from_offset, LiveMode::CatchUp).await?;
            self.deliver(batch.rows, &sink).await?;
            self.resume_store.set_last_synced_offset(&self.session_id, batch.next_offset).await;
            from_offset = Some(batch.next_offset);
            if batch.up_to_date {
                break;
            }
        }

        // Live phase: long-poll repeatedly, reconnecting with backoff on error.
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.transport.read(&self.stream_url, from_offset, LiveMode::LongPoll).await {
                Ok(batch) => {
                    attempt = 0;
                    self.deliver(batch.rows, &sink).await?;
                    self.resume_store.set_last_synced_offset(&self.session_id, batch.next_offset).await;
                    from_offset = Some(batch.next_offset);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(ClientError::BackoffExhausted(attempt - 1));
                    }
                    log::warn!("session {} stream read failed (attempt {attempt}): {err}", self.session_id);
                    let delay = backoff_delay(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Ok(()),
                    }
                }
            }
        }
    }

    async fn deliver(&mut self, rows: Vec<SubscriberRow>, sink: &mpsc::Sender<SubscriberRow>) -> ClientResult<()> {
        for row in rows {
            let key = (row.message_id, row.seq);
            if !self.seen.insert(key) {
                continue;
            }
            if sink.send(row).await.is_err() {
                return Err(ClientError::Transport("projection sink closed".to_string()));
            }
        }
        Ok(())
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = INITIAL_BACKOFF.saturating_mul(1u32 << attempt.min(8));
    scaled.min(MAX_BACKOFF)
}
