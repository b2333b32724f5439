//! Deserializes the HTTP wire row shape (spec §6 "Row payload taxonomy")
//! into the subscriber's internal, offset-stamped row type.

use chatlog_session::{ChunkPayload, MessageId, Role};
use chatlog_store::Offset;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRow {
    message_id: MessageId,
    actor_id: String,
    role: Role,
    chunk: String,
    seq: u64,
    created_at: String,
}

/// One row as consumed by the projection engine: the store-assigned
/// offset plus the parsed chunk payload. `offset` is filled in by the
/// caller from context (the wire row itself doesn't carry its own
/// offset; it's implied by arrival order and the batch's `next_offset`).
#[derive(Debug, Clone)]
pub struct SubscriberRow {
    pub offset: Offset,
    pub message_id: MessageId,
    pub actor_id: String,
    pub role: Role,
    pub payload: ChunkPayload,
    pub seq: u64,
    pub created_at: String,
}

pub fn parse_wire_rows(body: &[u8], starting_offset: Offset) -> Result<Vec<SubscriberRow>, serde_json::Error> {
    let wire_rows: Vec<WireRow> = serde_json::from_slice(body)?;
    let mut offset = starting_offset;
    let mut rows = Vec::with_capacity(wire_rows.len());
    for wire_row in wire_rows {
        let payload: ChunkPayload = serde_json::from_str(&wire_row.chunk)?;
        rows.push(SubscriberRow {
            offset,
            message_id: wire_row.message_id,
            actor_id: wire_row.actor_id,
            role: wire_row.role,
            payload,
            seq: wire_row.seq,
            created_at: wire_row.created_at,
        });
        offset = offset.next();
    }
    Ok(rows)
}

/// Parses a single SSE `data:` payload (already stripped of the `data:`
/// prefix by the frame decoder) the same way, advancing `offset` by one.
pub fn parse_wire_row(data: &str, offset: Offset) -> Result<SubscriberRow, serde_json::Error> {
    let wire_row: WireRow = serde_json::from_str(data)?;
    let payload: ChunkPayload = serde_json::from_str(&wire_row.chunk)?;
    Ok(SubscriberRow {
        offset,
        message_id: wire_row.message_id,
        actor_id: wire_row.actor_id,
        role: wire_row.role,
        payload,
        seq: wire_row.seq,
        created_at: wire_row.created_at,
    })
}
