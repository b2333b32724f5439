//! Projection engine (C6, spec §4.6): six derived views, each a pure fold
//! over the deduplicated row set. Updating incrementally as rows arrive
//! must equal re-running the fold from scratch (spec §8 idempotence law),
//! so `apply` keeps its own `(messageId, seq)` guard independent of
//! whatever deduplication the subscriber sync loop already did.
//!
//! Generalized from `EventProjectionStore::on_event`'s match-per-kind
//! folding pattern: one state machine per entity kind, driven off the
//! same tagged-variant dispatch the chunk payload already uses.

use crate::wire::SubscriberRow;
use chatlog_session::{ChunkPayload, MessageId, MessagePart, Role, Usage};
use chatlog_store::Offset;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallState {
    Pending,
    Executing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ProjectedMessage {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub is_complete: bool,
    pub error: Option<String>,
    pub started_at: Offset,
}

#[derive(Debug, Clone)]
pub struct ProjectedToolCall {
    pub id: String,
    pub message_id: MessageId,
    pub name: Option<String>,
    pub arguments: String,
    pub input: Option<serde_json::Value>,
    pub state: ToolCallState,
}

#[derive(Debug, Clone)]
pub struct ProjectedToolResult {
    pub message_id: MessageId,
    pub tool_call_id: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ProjectedApproval {
    pub id: String,
    pub tool_call_id: Option<String>,
    pub status: ApprovalStatus,
}

#[derive(Debug, Clone)]
pub struct ActiveGeneration {
    pub message_id: MessageId,
    pub last_chunk_seq: u64,
    pub last_chunk_offset: Offset,
    pub last_chunk_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub messages_by_role: HashMap<String, u64>,
    pub tool_call_count: u64,
    pub approval_count: u64,
    pub usage: Usage,
}

struct ToolCallAccum {
    name: Option<String>,
    arguments: String,
    input: Option<serde_json::Value>,
    state: ToolCallState,
}

struct ApprovalAccum {
    tool_call_id: Option<String>,
    status: ApprovalStatus,
}

enum MessageKind {
    Whole(chatlog_session::EmbeddedMessage),
    Streamed {
        text: String,
        tool_call_order: Vec<String>,
        tool_calls: HashMap<String, ToolCallAccum>,
        tool_results: Vec<(String, serde_json::Value)>,
        approval_order: Vec<String>,
        approvals: HashMap<String, ApprovalAccum>,
    },
}

struct MessageAccumulator {
    role: Role,
    kind: MessageKind,
    started_at: Offset,
    last_seq: u64,
    last_offset: Offset,
    last_created_at: String,
    is_complete: bool,
    error: Option<String>,
    usage: Option<Usage>,
}

/// Accumulates the deduplicated row set and derives the six views named
/// by spec §4.6. `subscribe_changes` gives an offset-ordered notification
/// stream: a receiver sees one notification per applied row, in offset
/// order, only after that row's effect on every view is already visible.
pub struct ProjectionEngine {
    messages: BTreeMap<MessageId, MessageAccumulator>,
    seen: HashSet<(MessageId, u64)>,
    changes: broadcast::Sender<Offset>,
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(256);
        ProjectionEngine { messages: BTreeMap::new(), seen: HashSet::new(), changes }
    }
}

impl ProjectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<Offset> {
        self.changes.subscribe()
    }

    /// Folds one row into every view. A repeat of an already-applied
    /// `(messageId, seq)` is a no-op (spec §8: `P(rows) == P(rows + duplicates)`).
    pub fn apply(&mut self, row: &SubscriberRow) {
        if !self.seen.insert((row.message_id, row.seq)) {
            return;
        }

        let accumulator = self.messages.entry(row.message_id).or_insert_with(|| MessageAccumulator {
            role: row.role,
            kind: match &row.payload {
                ChunkPayload::WholeMessage { message } => MessageKind::Whole(message.clone()),
                _ => MessageKind::Streamed {
                    text: String::new(),
                    tool_call_order: Vec::new(),
                    tool_calls: HashMap::new(),
                    tool_results: Vec::new(),
                    approval_order: Vec::new(),
                    approvals: HashMap::new(),
                },
            },
            started_at: row.offset,
            last_seq: row.seq,
            last_offset: row.offset,
            last_created_at: row.created_at.clone(),
            is_complete: matches!(row.payload, ChunkPayload::WholeMessage { .. }),
            error: None,
            usage: None,
        });

        accumulator.last_seq = row.seq;
        accumulator.last_offset = row.offset;
        accumulator.last_created_at = row.created_at.clone();

        if let MessageKind::Streamed { text, tool_call_order, tool_calls, tool_results, approval_order, approvals } =
            &mut accumulator.kind
        {
            match &row.payload {
                ChunkPayload::WholeMessage { .. } => {}
                ChunkPayload::Content { delta, content, .. } => {
                    if let Some(delta) = delta {
                        text.push_str(delta);
                    } else if let Some(content) = content {
                        text.push_str(content);
                    }
                }
                ChunkPayload::ToolCall { tool_call } => {
                    let entry = tool_calls.entry(tool_call.id.clone()).or_insert_with(|| {
                        tool_call_order.push(tool_call.id.clone());
                        ToolCallAccum { name: None, arguments: String::new(), input: None, state: ToolCallState::Pending }
                    });
                    if tool_call.function.name.is_some() {
                        entry.name = tool_call.function.name.clone();
                    }
                    entry.arguments.push_str(&tool_call.function.arguments);
                }
                ChunkPayload::ToolInputAvailable { tool_call_id, input } => {
                    let entry = tool_calls.entry(tool_call_id.clone()).or_insert_with(|| {
                        tool_call_order.push(tool_call_id.clone());
                        ToolCallAccum { name: None, arguments: String::new(), input: None, state: ToolCallState::Pending }
                    });
                    entry.input = Some(input.clone());
                    entry.state = ToolCallState::Executing;
                }
                ChunkPayload::ToolResult { tool_call_id, content } => {
                    if let Some(entry) = tool_calls.get_mut(tool_call_id) {
                        entry.state = ToolCallState::Done;
                    }
                    tool_results.push((tool_call_id.clone(), content.clone()));
                }
                ChunkPayload::ApprovalRequested { approval, tool_call_id } => {
                    approval_order.push(approval.id.clone());
                    approvals.insert(
                        approval.id.clone(),
                        ApprovalAccum { tool_call_id: tool_call_id.clone(), status: ApprovalStatus::Pending },
                    );
                }
                ChunkPayload::ApprovalResponse { approval_id, approved } => {
                    if let Some(entry) = approvals.get_mut(approval_id) {
                        entry.status = if *approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
                    }
                }
                ChunkPayload::Done { usage, .. } => {
                    accumulator.is_complete = true;
                    accumulator.usage = usage.clone();
                }
                ChunkPayload::Stop { .. } => {
                    accumulator.is_complete = true;
                }
                ChunkPayload::Error { error } => {
                    accumulator.is_complete = true;
                    accumulator.error = Some(error.clone());
                }
            }
        } else if let ChunkPayload::WholeMessage { message } = &row.payload {
            accumulator.kind = MessageKind::Whole(message.clone());
        }

        let _ = self.changes.send(row.offset);
    }

    /// Messages in display order: by the offset of their first chunk, not
    /// by `messageId` (spec §4.6 "Ordering").
    pub fn messages(&self) -> Vec<ProjectedMessage> {
        let mut messages: Vec<ProjectedMessage> = self
            .messages
            .iter()
            .map(|(id, accumulator)| ProjectedMessage {
                id: *id,
                role: accumulator.role,
                parts: self.parts_for(accumulator),
                is_complete: accumulator.is_complete,
                error: accumulator.error.clone(),
                started_at: accumulator.started_at,
            })
            .collect();
        messages.sort_by_key(|message| message.started_at);
        messages
    }

    fn parts_for(&self, accumulator: &MessageAccumulator) -> Vec<MessagePart> {
        match &accumulator.kind {
            MessageKind::Whole(message) => message.parts.clone(),
            MessageKind::Streamed { text, tool_call_order, tool_calls, tool_results, approval_order, approvals } => {
                let mut parts = Vec::new();
                if !text.is_empty() {
                    parts.push(MessagePart::Text { content: text.clone() });
                }
                for id in tool_call_order {
                    if let Some(entry) = tool_calls.get(id) {
                        parts.push(MessagePart::ToolCall {
                            id: id.clone(),
                            name: entry.name.clone(),
                            arguments: entry.arguments.clone(),
                        });
                    }
                }
                for (tool_call_id, content) in tool_results {
                    parts.push(MessagePart::ToolResult {
                        tool_call_id: tool_call_id.clone(),
                        content: content.clone(),
                        is_error: false,
                    });
                }
                for id in approval_order {
                    if let Some(entry) = approvals.get(id) {
                        parts.push(MessagePart::ApprovalRequest { id: id.clone(), tool_call_id: entry.tool_call_id.clone() });
                    }
                }
                parts
            }
        }
    }

    pub fn tool_calls(&self) -> Vec<ProjectedToolCall> {
        let mut out = Vec::new();
        for (message_id, accumulator) in &self.messages {
            if let MessageKind::Streamed { tool_call_order, tool_calls, .. } = &accumulator.kind {
                for id in tool_call_order {
                    if let Some(entry) = tool_calls.get(id) {
                        out.push(ProjectedToolCall {
                            id: id.clone(),
                            message_id: *message_id,
                            name: entry.name.clone(),
                            arguments: entry.arguments.clone(),
                            input: entry.input.clone(),
                            state: entry.state,
                        });
                    }
                }
            }
        }
        out
    }

    /// One per `(messageId, toolCallId)` (spec §4.6 "Tool results").
    pub fn tool_results(&self) -> Vec<ProjectedToolResult> {
        let mut out = Vec::new();
        for (message_id, accumulator) in &self.messages {
            if let MessageKind::Streamed { tool_results, .. } = &accumulator.kind {
                for (tool_call_id, content) in tool_results {
                    out.push(ProjectedToolResult { message_id: *message_id, tool_call_id: tool_call_id.clone(), content: content.clone() });
                }
            }
        }
        out
    }

    pub fn approvals(&self) -> Vec<ProjectedApproval> {
        let mut out = Vec::new();
        for accumulator in self.messages.values() {
            if let MessageKind::Streamed { approval_order, approvals, .. } = &accumulator.kind {
                for id in approval_order {
                    if let Some(entry) = approvals.get(id) {
                        out.push(ProjectedApproval { id: id.clone(), tool_call_id: entry.tool_call_id.clone(), status: entry.status });
                    }
                }
            }
        }
        out
    }

    /// Messages lacking a terminal chunk (spec §4.6 "Active generations").
    pub fn active_generations(&self) -> Vec<ActiveGeneration> {
        self.messages
            .iter()
            .filter(|(_, accumulator)| !accumulator.is_complete)
            .map(|(id, accumulator)| ActiveGeneration {
                message_id: *id,
                last_chunk_seq: accumulator.last_seq,
                last_chunk_offset: accumulator.last_offset,
                last_chunk_at: accumulator.last_created_at.clone(),
            })
            .collect()
    }

    /// Patches a message's sort offset in place without touching its
    /// content — used by the optimistic layer (C7) to swap a locally
    /// assigned placeholder offset for the server-confirmed one once the
    /// synced row arrives, so the message's position in `messages()`
    /// reflects reality without the view flickering (spec §4.7).
    pub fn reconcile_offset(&mut self, message_id: MessageId, confirmed_offset: Offset) {
        if let Some(accumulator) = self.messages.get_mut(&message_id) {
            accumulator.started_at = confirmed_offset;
            accumulator.last_offset = confirmed_offset;
        }
    }

    /// Removes a message's accumulator entirely, including its dedup
    /// keys — used by the optimistic layer to undo an insert that the
    /// server rejected (spec §4.7 "rolled back").
    pub fn rollback_message(&mut self, message_id: MessageId) {
        if self.messages.remove(&message_id).is_some() {
            self.seen.retain(|(id, _)| *id != message_id);
        }
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for accumulator in self.messages.values() {
            let role_key = match accumulator.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            *stats.messages_by_role.entry(role_key.to_string()).or_insert(0) += 1;

            if let MessageKind::Streamed { tool_call_order, approval_order, .. } = &accumulator.kind {
                stats.tool_call_count += tool_call_order.len() as u64;
                stats.approval_count += approval_order.len() as u64;
            }

            if let Some(usage) = &accumulator.usage {
                stats.usage.prompt_tokens = add(stats.usage.prompt_tokens, usage.prompt_tokens);
                stats.usage.completion_tokens = add(stats.usage.completion_tokens, usage.completion_tokens);
                stats.usage.total_tokens = add(stats.usage.total_tokens, usage.total_tokens);
            }
        }
        stats
    }
}

fn add(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlog_session::{ApprovalRef, ToolCallFragment, ToolCallFunction};
    use uuid::Uuid;

    fn row(message_id: MessageId, seq: u64, offset: u64, role: Role, payload: ChunkPayload) -> SubscriberRow {
        SubscriberRow {
            offset: Offset::new(offset),
            message_id,
            actor_id: "a".into(),
            role,
            payload,
            seq,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn whole_message_then_streamed_reply_projects_in_offset_order() {
        let u1 = Uuid::new_v4();
        let a1 = Uuid::new_v4();
        let mut engine = ProjectionEngine::new();

        engine.apply(&row(
            u1,
            0,
            0,
            Role::User,
            ChunkPayload::WholeMessage {
                message: chatlog_session::EmbeddedMessage {
                    id: u1,
                    role: Role::User,
                    parts: vec![MessagePart::Text { content: "Hello".into() }],
                    created_at: time::OffsetDateTime::now_utc(),
                },
            },
        ));
        engine.apply(&row(a1, 0, 1, Role::Assistant, ChunkPayload::Content { delta: Some("Hi".into()), content: None, role: None }));
        engine.apply(&row(a1, 1, 2, Role::Assistant, ChunkPayload::Content { delta: Some(" there".into()), content: None, role: None }));
        engine.apply(&row(a1, 2, 3, Role::Assistant, ChunkPayload::Done { finish_reason: None, usage: None }));

        let messages = engine.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, u1);
        assert_eq!(messages[1].id, a1);
        assert!(messages[1].is_complete);
        match &messages[1].parts[0] {
            MessagePart::Text { content } => assert_eq!(content, "Hi there"),
            other => panic!("expected text part, got {other:?}"),
        }
        assert!(engine.active_generations().is_empty());
    }

    #[test]
    fn duplicate_row_is_a_no_op() {
        let a1 = Uuid::new_v4();
        let mut engine = ProjectionEngine::new();
        let chunk = row(a1, 0, 0, Role::Assistant, ChunkPayload::Content { delta: Some("x".into()), content: None, role: None });
        engine.apply(&chunk);
        engine.apply(&chunk);
        match &engine.messages()[0].parts[0] {
            MessagePart::Text { content } => assert_eq!(content, "x"),
            other => panic!("expected text part, got {other:?}"),
        }
    }

    #[test]
    fn tool_call_accumulates_arguments_and_approval_resolves() {
        let a1 = Uuid::new_v4();
        let mut engine = ProjectionEngine::new();
        engine.apply(&row(
            a1,
            0,
            0,
            Role::Assistant,
            ChunkPayload::ToolCall {
                tool_call: ToolCallFragment { id: "T1".into(), function: ToolCallFunction { name: Some("X".into()), arguments: "{\"a\":".into() } },
            },
        ));
        engine.apply(&row(
            a1,
            1,
            1,
            Role::Assistant,
            ChunkPayload::ToolCall {
                tool_call: ToolCallFragment { id: "T1".into(), function: ToolCallFunction { name: None, arguments: "1}".into() } },
            },
        ));
        engine.apply(&row(
            a1,
            2,
            2,
            Role::Assistant,
            ChunkPayload::ApprovalRequested { approval: ApprovalRef { id: "AP1".into() }, tool_call_id: Some("T1".into()) },
        ));

        let tool_calls = engine.tool_calls();
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].arguments, "{\"a\":1}");
        assert_eq!(tool_calls[0].name.as_deref(), Some("X"));

        let approvals = engine.approvals();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].status, ApprovalStatus::Pending);

        engine.apply(&row(a1, 3, 3, Role::Assistant, ChunkPayload::ApprovalResponse { approval_id: "AP1".into(), approved: true }));
        assert_eq!(engine.approvals()[0].status, ApprovalStatus::Approved);
    }
}
