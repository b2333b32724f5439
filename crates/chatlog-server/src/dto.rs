//! Wire DTOs for the HTTP API (spec §6).

use chatlog_session::{AgentRegistration, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub stream_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message_id: Option<MessageId>,
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    pub actor_id: Option<String>,
    pub agent: Option<AgentRegistration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    pub from_message_id: MessageId,
    pub content: String,
    pub actor_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
pub struct AgentsRequest {
    pub agents: Vec<AgentRegistration>,
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentRegistration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultRequest {
    pub tool_call_id: String,
    pub output: Value,
    pub error: Option<String>,
    pub message_id: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkRequest {
    pub at_message_id: Option<MessageId>,
    pub new_session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkResponse {
    pub session_id: Uuid,
    pub offset: String,
}
