//! The boundary between the ingestion pipeline and whatever owns the
//! session log. Kept generic so this crate has no dependency on the
//! session/domain model — a single generation's destination.

use async_trait::async_trait;
use serde_json::Value;

/// Why a generation ended. Exactly one of these is appended per
/// generation, on every exit path.
#[derive(Debug, Clone)]
pub enum Terminal {
    Done {
        finish_reason: Option<String>,
        usage: Option<Value>,
    },
    Stop {
        reason: String,
    },
    Error {
        message: String,
    },
}

/// Destination for decoded frames. One instance per generation.
///
/// Each method corresponds to one [`crate::decode::Frame`] variant; the
/// decoder routes a frame to the matching method instead of collapsing
/// every frame kind into a content delta.
#[async_trait]
pub trait ChunkSink: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// Append a content delta. Called with the buffered, concatenated text
    /// once a prior append completes (flush-on-completion policy).
    async fn append_content(&self, delta: String) -> Result<(), Self::Error>;

    /// Append a tool-call fragment. `arguments` is itself a delta — the
    /// same tool call id arrives across multiple calls as its argument
    /// string streams in.
    async fn append_tool_call(&self, id: String, name: Option<String>, arguments: String) -> Result<(), Self::Error>;

    /// Append the fully materialized input for a previously started tool
    /// call.
    async fn append_tool_input_available(&self, tool_call_id: String, input: Value) -> Result<(), Self::Error>;

    /// Append a tool's result.
    async fn append_tool_result(&self, tool_call_id: String, content: Value) -> Result<(), Self::Error>;

    /// Append an approval request, optionally tied to a tool call.
    async fn append_approval_requested(
        &self,
        approval_id: String,
        tool_call_id: Option<String>,
    ) -> Result<(), Self::Error>;

    /// Append the generation's terminal chunk. Called exactly once.
    async fn append_terminal(&self, terminal: Terminal) -> Result<(), Self::Error>;
}
