//! The chunk/domain model (spec §3, §6 row payload taxonomy).

use chatlog_store::Offset;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub type SessionId = Uuid;
pub type MessageId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One part of a materialized [`EmbeddedMessage`] — used only inside
/// `whole-message` chunks; streamed assistant messages are folded from
/// chunk payloads on the subscriber instead (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        content: String,
    },
    ToolCall {
        id: String,
        name: Option<String>,
        arguments: String,
    },
    ToolResult {
        tool_call_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    ApprovalRequest {
        id: String,
        tool_call_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedMessage {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: Option<String>,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub id: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRef {
    pub id: String,
}

/// Token usage; upstreams emit both camelCase and snake_case field names
/// (spec §4.6, §9), so every field accepts either on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(alias = "promptTokens", skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(alias = "completionTokens", skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(alias = "totalTokens", skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// The parsed `type` of a chunk's payload (spec §6 row payload taxonomy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChunkPayload {
    #[serde(rename = "whole-message")]
    WholeMessage { message: EmbeddedMessage },

    #[serde(rename = "content")]
    Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },

    #[serde(rename = "tool_call")]
    ToolCall { tool_call: ToolCallFragment },

    #[serde(rename = "tool-input-available")]
    ToolInputAvailable {
        tool_call_id: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        content: serde_json::Value,
    },

    #[serde(rename = "approval-requested")]
    ApprovalRequested {
        approval: ApprovalRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },

    #[serde(rename = "approval-response")]
    ApprovalResponse { approval_id: String, approved: bool },

    #[serde(rename = "done")]
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    #[serde(rename = "stop")]
    Stop { reason: String },

    #[serde(rename = "error")]
    Error { error: String },
}

impl ChunkPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            ChunkPayload::WholeMessage { .. } => "whole-message",
            ChunkPayload::Content { .. } => "content",
            ChunkPayload::ToolCall { .. } => "tool_call",
            ChunkPayload::ToolInputAvailable { .. } => "tool-input-available",
            ChunkPayload::ToolResult { .. } => "tool_result",
            ChunkPayload::ApprovalRequested { .. } => "approval-requested",
            ChunkPayload::ApprovalResponse { .. } => "approval-response",
            ChunkPayload::Done { .. } => "done",
            ChunkPayload::Stop { .. } => "stop",
            ChunkPayload::Error { .. } => "error",
        }
    }

    /// Terminal chunk kinds close a generation (spec §3 invariant 3).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChunkPayload::Done { .. } | ChunkPayload::Stop { .. } | ChunkPayload::Error { .. }
        )
    }
}

/// The log's atomic append unit (spec §3 "Chunk (log record)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub session_id: SessionId,
    pub message_id: MessageId,
    pub seq: u64,
    pub actor_id: String,
    pub role: Role,
    pub payload: ChunkPayload,
    pub created_at: OffsetDateTime,
    /// Filled in by `chatlog-store` after a successful append; absent on a
    /// chunk that has not yet been durably recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

impl Chunk {
    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }
}

pub fn session_key(session_id: SessionId) -> String {
    session_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_payload_type_names_match_wire_taxonomy() {
        assert_eq!(
            ChunkPayload::Stop { reason: "x".into() }.type_name(),
            "stop"
        );
        assert_eq!(
            ChunkPayload::ToolInputAvailable {
                tool_call_id: "t1".into(),
                input: serde_json::json!({}),
            }
            .type_name(),
            "tool-input-available"
        );
    }

    #[test]
    fn only_done_stop_error_are_terminal() {
        assert!(ChunkPayload::Done { finish_reason: None, usage: None }.is_terminal());
        assert!(ChunkPayload::Stop { reason: "x".into() }.is_terminal());
        assert!(ChunkPayload::Error { error: "x".into() }.is_terminal());
        assert!(!ChunkPayload::Content { delta: Some("x".into()), content: None, role: None }.is_terminal());
    }

    #[test]
    fn usage_accepts_camel_and_snake_case() {
        let camel: Usage = serde_json::from_str(
            r#"{"promptTokens": 1, "completionTokens": 2, "totalTokens": 3}"#,
        )
        .unwrap();
        assert_eq!(camel.total_tokens, Some(3));

        let snake: Usage = serde_json::from_str(
            r#"{"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}"#,
        )
        .unwrap();
        assert_eq!(snake.total_tokens, Some(3));
    }

    #[test]
    fn chunk_round_trips_through_json() {
        let chunk = Chunk {
            session_id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            seq: 0,
            actor_id: "user-1".into(),
            role: Role::User,
            payload: ChunkPayload::Stop { reason: "cancelled".into() },
            created_at: OffsetDateTime::now_utc(),
            offset: Some(Offset::new(4)),
        };
        let json = serde_json::to_vec(&chunk).unwrap();
        let back: Chunk = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.seq, chunk.seq);
        assert_eq!(back.message_id, chunk.message_id);
    }
}
