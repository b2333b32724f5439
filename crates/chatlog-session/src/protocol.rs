//! Session protocol (C4): the single entry point domain code must use to
//! mutate a session. Direct log access is forbidden outside this module
//! ("domain code MUST NOT call EventJournal directly").

use crate::agent::AgentRegistration;
use crate::chunk::{Chunk, ChunkPayload, EmbeddedMessage, MessageId, MessagePart, Role, SessionId};
use crate::error::{SessionError, SessionResult};
use crate::orchestrator::AgentOrchestrator;
use crate::session_log::SessionLog;
use chatlog_store::{Offset, ReadMode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-session mutable state owned exclusively by the session actor
/// (spec §5 "Shared-resource policy"): registered agents and the
/// active-generation abort-handle table.
struct SessionMetadata {
    agents: Vec<AgentRegistration>,
    abort_handles: HashMap<MessageId, CancellationToken>,
}

impl SessionMetadata {
    fn new() -> Self {
        Self {
            agents: Vec::new(),
            abort_handles: HashMap::new(),
        }
    }
}

pub struct SessionProtocol {
    session_log: Arc<SessionLog>,
    orchestrator: AgentOrchestrator,
    metadata: Mutex<HashMap<SessionId, Arc<Mutex<SessionMetadata>>>>,
}

impl SessionProtocol {
    pub fn new(session_log: Arc<SessionLog>, orchestrator: AgentOrchestrator) -> Arc<Self> {
        Arc::new(Self {
            session_log,
            orchestrator,
            metadata: Mutex::new(HashMap::new()),
        })
    }

    async fn metadata_for(&self, session_id: SessionId) -> Arc<Mutex<SessionMetadata>> {
        let mut all = self.metadata.lock().await;
        all.entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(SessionMetadata::new())))
            .clone()
    }

    /// send-message: append one `whole-message` chunk with seq=0; invoke an
    /// inline agent if given; fan out to every registered agent whose
    /// trigger matches, concurrently and without blocking the caller.
    pub async fn send_message(
        self: &Arc<Self>,
        session_id: SessionId,
        content: String,
        actor_id: &str,
        message_id: Option<MessageId>,
        inline_agent: Option<AgentRegistration>,
    ) -> SessionResult<MessageId> {
        if content.trim().is_empty() {
            return Err(SessionError::InvalidInput("content must not be empty".to_string()));
        }

        self.session_log.open(session_id).await?;
        let message_id = message_id.unwrap_or_else(Uuid::new_v4);

        let message = EmbeddedMessage {
            id: message_id,
            role: Role::User,
            parts: vec![MessagePart::Text { content: content.clone() }],
            created_at: OffsetDateTime::now_utc(),
        };

        self.session_log
            .append(
                session_id,
                message_id,
                actor_id,
                Role::User,
                ChunkPayload::WholeMessage { message },
            )
            .await?;

        let registered = {
            let metadata = self.metadata_for(session_id).await;
            let guard = metadata.lock().await;
            guard.agents.clone()
        };

        let history = self.materialize_history(session_id).await?;

        if let Some(agent) = inline_agent {
            self.spawn_invocation(session_id, agent, history.clone(), actor_id);
        }

        for agent in registered.into_iter().filter(|a| a.matches(true)) {
            self.spawn_invocation(session_id, agent, history.clone(), actor_id);
        }

        Ok(message_id)
    }

    fn spawn_invocation(
        self: &Arc<Self>,
        session_id: SessionId,
        agent: AgentRegistration,
        history: Value,
        actor_id: &str,
    ) {
        let this = self.clone();
        let actor_id = actor_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = this.invoke_agent(session_id, agent, history, &actor_id).await {
                log::warn!("agent invocation failed: {err}");
            }
        });
    }

    /// invoke-agent: mint a messageId, register an abort handle, call the
    /// agent endpoint, tee the response through C3.
    pub async fn invoke_agent(
        self: &Arc<Self>,
        session_id: SessionId,
        agent: AgentRegistration,
        history: Value,
        actor_id: &str,
    ) -> SessionResult<MessageId> {
        let message_id = Uuid::new_v4();
        let token = CancellationToken::new();

        let metadata = self.metadata_for(session_id).await;
        metadata.lock().await.abort_handles.insert(message_id, token.clone());

        let result = self
            .orchestrator
            .invoke(
                self.session_log.clone(),
                session_id,
                message_id,
                actor_id,
                &agent,
                history,
                token,
            )
            .await;

        metadata.lock().await.abort_handles.remove(&message_id);
        result.map(|_| message_id)
    }

    pub async fn register_agents(&self, session_id: SessionId, agents: Vec<AgentRegistration>) -> SessionResult<()> {
        let metadata = self.metadata_for(session_id).await;
        let mut guard = metadata.lock().await;
        for agent in agents {
            if let Some(existing) = guard.agents.iter_mut().find(|a| a.id == agent.id) {
                *existing = agent;
            } else {
                guard.agents.push(agent);
            }
        }
        Ok(())
    }

    pub async fn unregister_agent(&self, session_id: SessionId, agent_id: &str) -> SessionResult<()> {
        let metadata = self.metadata_for(session_id).await;
        metadata.lock().await.agents.retain(|a| a.id != agent_id);
        Ok(())
    }

    pub async fn list_agents(&self, session_id: SessionId) -> Vec<AgentRegistration> {
        let metadata = self.metadata_for(session_id).await;
        metadata.lock().await.agents.clone()
    }

    pub async fn tool_result(
        &self,
        session_id: SessionId,
        tool_call_id: &str,
        output: Value,
        error: Option<String>,
        message_id: Option<MessageId>,
        actor_id: &str,
    ) -> SessionResult<()> {
        let message_id = message_id
            .or_else(|| self.session_log.resolve_tool_call_owner(tool_call_id))
            .ok_or_else(|| SessionError::InvalidInput(format!("unknown tool call {tool_call_id}")))?;

        let content = match error {
            Some(err) => serde_json::json!({ "output": output, "error": err }),
            None => output,
        };

        self.session_log
            .append(
                session_id,
                message_id,
                actor_id,
                Role::System,
                ChunkPayload::ToolResult { tool_call_id: tool_call_id.to_string(), content },
            )
            .await?;
        Ok(())
    }

    pub async fn approval_response(
        &self,
        session_id: SessionId,
        approval_id: &str,
        approved: bool,
        actor_id: &str,
    ) -> SessionResult<()> {
        let message_id = self
            .session_log
            .resolve_approval_owner(approval_id)
            .ok_or_else(|| SessionError::InvalidInput(format!("unknown approval {approval_id}")))?;

        self.session_log
            .append(
                session_id,
                message_id,
                actor_id,
                Role::System,
                ChunkPayload::ApprovalResponse { approval_id: approval_id.to_string(), approved },
            )
            .await?;
        Ok(())
    }

    /// stop-generation: a specific messageId aborts that one, None aborts
    /// every active generation for the session. Best-effort: the terminal
    /// chunk itself is written by the ingestion pipeline reacting to
    /// cancellation, not here.
    pub async fn stop_generation(&self, session_id: SessionId, message_id: Option<MessageId>) -> SessionResult<()> {
        let metadata = self.metadata_for(session_id).await;
        let guard = metadata.lock().await;
        match message_id {
            Some(id) => {
                if let Some(token) = guard.abort_handles.get(&id) {
                    token.cancel();
                }
            }
            None => {
                for token in guard.abort_handles.values() {
                    token.cancel();
                }
            }
        }
        Ok(())
    }

    /// fork: create a new session, copy agent registrations, and copy
    /// chunks with offset <= atMessageId's last chunk (or the whole log
    /// when atMessageId is absent). This is a full content copy, not a
    /// metadata-only fork.
    pub async fn fork(
        &self,
        source_session_id: SessionId,
        at_message_id: Option<MessageId>,
        new_session_id: Option<SessionId>,
    ) -> SessionResult<(SessionId, Offset)> {
        let batch = self
            .session_log
            .read(source_session_id, None, ReadMode::Catchup)
            .await
            .map_err(|err| match err {
                SessionError::Store(chatlog_store::StoreError::NotFound(_)) => {
                    SessionError::SourceNotFound(source_session_id)
                }
                other => other,
            })?;

        let cutoff_offset = match at_message_id {
            Some(target) => batch
                .rows
                .iter()
                .filter_map(|row| serde_json::from_slice::<Chunk>(&row.bytes).ok().map(|c| (c, row.offset)))
                .filter(|(chunk, _)| chunk.message_id == target)
                .map(|(_, offset)| offset)
                .max()
                .ok_or(SessionError::SourceNotFound(source_session_id))?,
            None => batch.rows.last().map(|r| r.offset).unwrap_or(Offset::ZERO),
        };

        let new_session_id = new_session_id.unwrap_or_else(Uuid::new_v4);
        self.session_log.open(new_session_id).await?;

        let mut last_offset = Offset::ZERO;
        for row in &batch.rows {
            if row.offset > cutoff_offset {
                break;
            }
            if let Ok(chunk) = serde_json::from_slice::<Chunk>(&row.bytes) {
                let appended = self
                    .session_log
                    .append(new_session_id, chunk.message_id, &chunk.actor_id, chunk.role, chunk.payload)
                    .await?;
                last_offset = appended.offset.unwrap_or(last_offset);
            }
        }

        let source_agents = self.list_agents(source_session_id).await;
        if !source_agents.is_empty() {
            self.register_agents(new_session_id, source_agents).await?;
        }

        Ok((new_session_id, last_offset))
    }

    /// A minimal materialization of the log into `{role, content}` pairs,
    /// suitable for the `messages` field an agent endpoint expects. The
    /// full six-view projection (C6) lives on the subscriber; this is just
    /// enough history to drive an agent call.
    async fn materialize_history(&self, session_id: SessionId) -> SessionResult<Value> {
        let batch = self.session_log.read(session_id, None, ReadMode::Catchup).await?;

        let mut order: Vec<MessageId> = Vec::new();
        let mut texts: HashMap<MessageId, String> = HashMap::new();
        let mut roles: HashMap<MessageId, Role> = HashMap::new();

        for row in &batch.rows {
            let Ok(chunk) = serde_json::from_slice::<Chunk>(&row.bytes) else {
                continue;
            };
            if !texts.contains_key(&chunk.message_id) {
                order.push(chunk.message_id);
                roles.insert(chunk.message_id, chunk.role);
            }
            let entry = texts.entry(chunk.message_id).or_default();
            match &chunk.payload {
                ChunkPayload::WholeMessage { message } => {
                    for part in &message.parts {
                        if let MessagePart::Text { content } = part {
                            entry.push_str(content);
                        }
                    }
                }
                ChunkPayload::Content { delta, content, .. } => {
                    if let Some(d) = delta {
                        entry.push_str(d);
                    }
                    if let Some(c) = content {
                        entry.push_str(c);
                    }
                }
                _ => {}
            }
        }

        let messages: Vec<Value> = order
            .into_iter()
            .map(|id| {
                let role = match roles.get(&id).copied().unwrap_or(Role::User) {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                serde_json::json!({ "role": role, "content": texts.get(&id).cloned().unwrap_or_default() })
            })
            .collect();

        Ok(Value::Array(messages))
    }
}
