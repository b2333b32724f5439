//! Offset-addressable per-session log store (C1).
//!
//! A [`StreamStore`] is an ordered, append-only byte log keyed by session.
//! Two implementations are provided: [`InMemoryStore`] for tests and
//! single-process embedding, and [`SqliteStore`] for durable,
//! crash-surviving persistence. Both assign the same kind of opaque
//! [`Offset`] and expose the same live-tail subscription.

pub mod error;
pub mod memory;
pub mod offset;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use offset::Offset;
pub use sqlite::SqliteStore;
pub use store::{ReadBatch, ReadMode, StoredRow, StreamStore};
