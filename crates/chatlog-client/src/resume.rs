//! Persisted subscriber state (spec §6 "Persisted subscriber state"):
//! last synced offset, a bounded message-history cache, and active-generation
//! descriptors, each with its own TTL. Modeled as an opaque key-value side
//! store per session_log.rs's "only the owner may mutate" discipline, but the
//! subscriber treats this store as a hint, never as a source of truth — the
//! log itself is authoritative and a cold store just means "start from zero".

use async_trait::async_trait;
use chatlog_store::Offset;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default TTL for cached message history (spec §6).
pub const MESSAGE_HISTORY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default TTL for an active-generation descriptor (spec §6).
pub const ACTIVE_GENERATION_TTL: Duration = Duration::from_secs(60 * 60);

/// Resume point for an in-flight generation the subscriber was following
/// when it disconnected: where to resume reading from, and where to read it.
#[derive(Debug, Clone)]
pub struct ActiveGenerationDescriptor {
    pub message_id: String,
    pub resume_offset: Offset,
    pub stream_url: String,
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Entry { value, expires_at: Instant::now() + ttl }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Per-session persisted subscriber state (spec §6). Implementations may
/// back this with `localStorage`-equivalents, a file, or (as here) memory;
/// the subscriber sync loop (C5) only ever reads it as a resume hint.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn last_synced_offset(&self, session_id: &str) -> Option<Offset>;
    async fn set_last_synced_offset(&self, session_id: &str, offset: Offset);

    async fn message_history(&self, session_id: &str) -> Option<serde_json::Value>;
    async fn set_message_history(&self, session_id: &str, history: serde_json::Value);

    async fn active_generation(&self, session_id: &str) -> Option<ActiveGenerationDescriptor>;
    async fn set_active_generation(&self, session_id: &str, descriptor: ActiveGenerationDescriptor);
    async fn clear_active_generation(&self, session_id: &str);
}

#[derive(Default)]
struct MemoryState {
    offsets: HashMap<String, Offset>,
    history: HashMap<String, Entry<serde_json::Value>>,
    active_generations: HashMap<String, Entry<ActiveGenerationDescriptor>>,
}

/// In-memory `ResumeStore`, good for a single process lifetime (tests, a
/// short-lived CLI subscriber) or as a template for a `localStorage`/file-
/// backed implementation with the same TTL discipline.
#[derive(Default, Clone)]
pub struct InMemoryResumeStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeStore for InMemoryResumeStore {
    async fn last_synced_offset(&self, session_id: &str) -> Option<Offset> {
        self.state.lock().offsets.get(session_id).copied()
    }

    async fn set_last_synced_offset(&self, session_id: &str, offset: Offset) {
        self.state.lock().offsets.insert(session_id.to_string(), offset);
    }

    async fn message_history(&self, session_id: &str) -> Option<serde_json::Value> {
        let mut state = self.state.lock();
        match state.history.get(session_id) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                state.history.remove(session_id);
                None
            }
            None => None,
        }
    }

    async fn set_message_history(&self, session_id: &str, history: serde_json::Value) {
        self.state
            .lock()
            .history
            .insert(session_id.to_string(), Entry::new(history, MESSAGE_HISTORY_TTL));
    }

    async fn active_generation(&self, session_id: &str) -> Option<ActiveGenerationDescriptor> {
        let mut state = self.state.lock();
        match state.active_generations.get(session_id) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                state.active_generations.remove(session_id);
                None
            }
            None => None,
        }
    }

    async fn set_active_generation(&self, session_id: &str, descriptor: ActiveGenerationDescriptor) {
        self.state
            .lock()
            .active_generations
            .insert(session_id.to_string(), Entry::new(descriptor, ACTIVE_GENERATION_TTL));
    }

    async fn clear_active_generation(&self, session_id: &str) {
        self.state.lock().active_generations.remove(session_id);
    }
}
