//! Streaming ingestion pipeline (C3).
//!
//! Converts a one-shot, event-stream-framed upstream byte stream into
//! durable chunks via a generic [`ChunkSink`] — this crate has no
//! knowledge of sessions, messages, or the chunk payload taxonomy, only of
//! content deltas and terminal markers.

pub mod decode;
pub mod error;
pub mod pipeline;
pub mod sink;

pub use decode::{Frame, FrameDecoder};
pub use error::{IngestError, IngestResult};
pub use pipeline::run_ingestion;
pub use sink::{ChunkSink, Terminal};
