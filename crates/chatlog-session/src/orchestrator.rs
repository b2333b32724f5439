//! Agent orchestrator (C8): opens the HTTP call to a registered agent and
//! tees the response into the ingestion pipeline (C3).

use crate::agent::AgentRegistration;
use crate::chunk::{ApprovalRef, ChunkPayload, MessageId, Role, SessionId, ToolCallFragment, ToolCallFunction, Usage};
use crate::error::{SessionError, SessionResult};
use crate::session_log::SessionLog;
use async_trait::async_trait;
use chatlog_ingest::{ChunkSink, Terminal, run_ingestion};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adapts [`SessionLog`] to the generic [`ChunkSink`] the ingestion
/// pipeline writes into, scoped to one generation.
#[derive(Clone)]
struct GenerationSink {
    session_log: Arc<SessionLog>,
    session_id: SessionId,
    message_id: MessageId,
    actor_id: String,
    role: Role,
}

#[async_trait]
impl ChunkSink for GenerationSink {
    type Error = SessionError;

    async fn append_content(&self, delta: String) -> SessionResult<()> {
        self.session_log
            .append(
                self.session_id,
                self.message_id,
                &self.actor_id,
                self.role,
                ChunkPayload::Content {
                    delta: Some(delta),
                    content: None,
                    role: None,
                },
            )
            .await
            .map(|_| ())
    }

    async fn append_tool_call(&self, id: String, name: Option<String>, arguments: String) -> SessionResult<()> {
        self.session_log
            .append(
                self.session_id,
                self.message_id,
                &self.actor_id,
                self.role,
                ChunkPayload::ToolCall {
                    tool_call: ToolCallFragment { id, function: ToolCallFunction { name, arguments } },
                },
            )
            .await
            .map(|_| ())
    }

    async fn append_tool_input_available(&self, tool_call_id: String, input: Value) -> SessionResult<()> {
        self.session_log
            .append(
                self.session_id,
                self.message_id,
                &self.actor_id,
                self.role,
                ChunkPayload::ToolInputAvailable { tool_call_id, input },
            )
            .await
            .map(|_| ())
    }

    async fn append_tool_result(&self, tool_call_id: String, content: Value) -> SessionResult<()> {
        self.session_log
            .append(
                self.session_id,
                self.message_id,
                &self.actor_id,
                self.role,
                ChunkPayload::ToolResult { tool_call_id, content },
            )
            .await
            .map(|_| ())
    }

    async fn append_approval_requested(&self, approval_id: String, tool_call_id: Option<String>) -> SessionResult<()> {
        self.session_log
            .append(
                self.session_id,
                self.message_id,
                &self.actor_id,
                self.role,
                ChunkPayload::ApprovalRequested { approval: ApprovalRef { id: approval_id }, tool_call_id },
            )
            .await
            .map(|_| ())
    }

    async fn append_terminal(&self, terminal: Terminal) -> SessionResult<()> {
        let payload = match terminal {
            Terminal::Done { finish_reason, usage } => ChunkPayload::Done {
                finish_reason,
                usage: usage.and_then(|v| serde_json::from_value::<Usage>(v).ok()),
            },
            Terminal::Stop { reason } => ChunkPayload::Stop { reason },
            Terminal::Error { message } => ChunkPayload::Error { error: message },
        };
        self.session_log
            .terminal(self.session_id, self.message_id, &self.actor_id, self.role, payload)
            .await
            .map(|_| ())
    }
}

#[derive(Clone)]
pub struct AgentOrchestrator {
    client: Client,
}

impl AgentOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the request body from `agent.body_template` merged with
    /// `{messages, stream: true}` (spec §4.8), call the endpoint, and feed
    /// the response body into the ingestion pipeline under `message_id`.
    pub async fn invoke(
        &self,
        session_log: Arc<SessionLog>,
        session_id: SessionId,
        message_id: MessageId,
        actor_id: &str,
        agent: &AgentRegistration,
        history: Value,
        cancel: CancellationToken,
    ) -> SessionResult<()> {
        let mut body = agent.body_template.clone().unwrap_or_else(|| json!({}));
        if let Value::Object(map) = &mut body {
            map.insert("messages".to_string(), history);
            map.insert("stream".to_string(), Value::Bool(true));
        }

        let mut request = self.client.post(&agent.endpoint).json(&body);
        if let Some(headers) = &agent.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let sink = GenerationSink {
            session_log,
            session_id,
            message_id,
            actor_id: actor_id.to_string(),
            role: Role::Assistant,
        };

        let response = match request.send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                let message = format!("agent endpoint returned {}", resp.status());
                sink.append_terminal(Terminal::Error { message: message.clone() }).await?;
                return Err(SessionError::UpstreamFailed(message));
            }
            Err(err) => {
                let message = err.to_string();
                sink.append_terminal(Terminal::Error { message: message.clone() }).await?;
                return Err(SessionError::UpstreamFailed(message));
            }
        };

        run_ingestion(response.bytes_stream(), sink, cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistration;
    use crate::chunk::Chunk;
    use chatlog_store::{InMemoryStore, ReadMode};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent_registration(endpoint: String) -> AgentRegistration {
        AgentRegistration {
            id: "a1".to_string(),
            name: None,
            endpoint,
            headers: None,
            triggers: crate::agent::TriggerMode::All,
            body_template: None,
        }
    }

    async fn chunks_for(session_log: &SessionLog, session_id: SessionId) -> Vec<Chunk> {
        let batch = session_log.read(session_id, None, ReadMode::Catchup).await.unwrap();
        batch
            .rows
            .iter()
            .map(|row| serde_json::from_slice(&row.bytes).unwrap())
            .collect()
    }

    /// Drives a real agent upstream (mocked over HTTP) through the
    /// orchestrator and the ingestion pipeline, proving `tool_call` and
    /// `approval-requested` chunks can be produced without seeding the
    /// log directly. Covers the "Tool call + approval" scenario end to
    /// end instead of only at the session-protocol layer.
    #[tokio::test]
    async fn agent_stream_produces_typed_tool_call_and_approval_chunks() {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\":\"tool_call\",\"id\":\"T1\",\"name\":\"X\",\"arguments\":\"{\\\"a\\\":\"}\n",
            "data: {\"type\":\"tool_call\",\"id\":\"T1\",\"arguments\":\"1}\"}\n",
            "data: {\"type\":\"approval-requested\",\"approval_id\":\"AP1\",\"tool_call_id\":\"T1\"}\n",
            "data: [DONE]\n",
        );
        Mock::given(method("POST"))
            .and(path("/agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let store: Arc<dyn chatlog_store::StreamStore> = Arc::new(InMemoryStore::new());
        let session_log = Arc::new(SessionLog::new(store));
        let session_id = SessionId::new_v4();
        let message_id = MessageId::new_v4();
        session_log.open(session_id).await.unwrap();

        let orchestrator = AgentOrchestrator::new(Client::new());
        let agent = agent_registration(format!("{}/agent", mock_server.uri()));

        orchestrator
            .invoke(
                session_log.clone(),
                session_id,
                message_id,
                "a1",
                &agent,
                json!([]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let chunks = chunks_for(&session_log, session_id).await;
        assert!(matches!(
            &chunks[0].payload,
            ChunkPayload::ToolCall { tool_call } if tool_call.id == "T1" && tool_call.function.name.as_deref() == Some("X")
        ));
        assert!(matches!(
            &chunks[1].payload,
            ChunkPayload::ToolCall { tool_call } if tool_call.id == "T1" && tool_call.function.arguments == "1}"
        ));
        assert!(matches!(
            &chunks[2].payload,
            ChunkPayload::ApprovalRequested { approval, tool_call_id }
                if approval.id == "AP1" && tool_call_id.as_deref() == Some("T1")
        ));
        assert!(matches!(&chunks[3].payload, ChunkPayload::Done { .. }));
    }
}
