//! Subscriber-side sync, projection, and optimistic-update layer for the
//! durable chat session backbone (C5, C6, C7).
//!
//! Composition: a [`subscriber::SubscriberSync`] tails the server's stream
//! endpoint via a [`transport::StreamReader`], persisting progress through
//! a [`resume::ResumeStore`] and deduplicating by `(messageId, seq)`
//! before handing rows to a [`projection::ProjectionEngine`]. A caller
//! performing a local send-message first runs it through an
//! [`optimistic::OptimisticBuffer`] so the UI updates before the server
//! round-trip completes; the buffer's `observe` call folds matching
//! synced rows in place instead of letting them re-apply as new content.

pub mod error;
pub mod optimistic;
pub mod projection;
pub mod resume;
pub mod subscriber;
pub mod transport;
pub mod wire;

pub use error::{ClientError, ClientResult};
pub use optimistic::OptimisticBuffer;
pub use projection::ProjectionEngine;
pub use resume::{InMemoryResumeStore, ResumeStore};
pub use subscriber::SubscriberSync;
pub use transport::{HttpStreamReader, LiveMode, StreamReader};
pub use wire::SubscriberRow;
