//! GET `/v1/stream/sessions/{sessionId}` (spec §6 "Stream read endpoint").

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use chatlog_session::Chunk;
use chatlog_store::{Offset, ReadBatch, ReadMode, StoredRow};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    /// Opaque resume cursor; equivalent to `offset` when present, kept as a
    /// distinct query parameter for subscribers that persist it verbatim
    /// (spec §6, "Persisted subscriber state").
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRow {
    message_id: Uuid,
    actor_id: String,
    role: chatlog_session::Role,
    /// The parsed chunk payload, re-encoded as a JSON string (spec §6: "chunk
    /// is itself a JSON string whose parsed `type` is one of ...").
    chunk: String,
    seq: u64,
    created_at: String,
}

fn to_wire_row(chunk: Chunk) -> Result<WireRow, ApiError> {
    let chunk_json = serde_json::to_string(&chunk.payload).map_err(|err| ApiError::from(anyhow::Error::new(err)))?;
    let created_at = chunk.created_at.format(&Rfc3339).map_err(|err| ApiError::from(anyhow::Error::new(err)))?;
    Ok(WireRow {
        message_id: chunk.message_id,
        actor_id: chunk.actor_id,
        role: chunk.role,
        chunk: chunk_json,
        seq: chunk.seq,
        created_at,
    })
}

fn header(name: &'static str, value: impl ToString) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(name),
        HeaderValue::from_str(&value.to_string()).expect("header value is ASCII-safe"),
    )
}

pub async fn get_stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let raw_offset = query.offset.as_deref().or(query.cursor.as_deref());
    let from_offset = raw_offset
        .map(Offset::from_str)
        .transpose()
        .map_err(|err| ApiError::from(anyhow::Error::msg(format!("invalid offset: {err}"))))?;

    match query.live.as_deref() {
        None => catch_up(&state, session_id, from_offset).await,
        Some("long-poll") => long_poll(&state, session_id, from_offset).await,
        Some("sse") => sse_stream(&state, session_id, from_offset).await,
        Some(other) => Err(ApiError::from(anyhow::Error::msg(format!("unknown live mode: {other}")))),
    }
}

async fn catch_up(state: &AppState, session_id: Uuid, from_offset: Option<Offset>) -> Result<Response, ApiError> {
    let batch = state.session_log.read(session_id, from_offset, ReadMode::Catchup).await?;
    respond(batch)
}

/// Long-poll: if the catch-up read already has rows, return them
/// immediately; otherwise wait on the live subscription up to
/// [`LONG_POLL_TIMEOUT`], collecting whatever arrives. A 204 with an
/// advanced `Stream-Next-Offset` signals "no new data yet" (spec §6).
async fn long_poll(state: &AppState, session_id: Uuid, from_offset: Option<Offset>) -> Result<Response, ApiError> {
    let batch = state.session_log.read(session_id, from_offset, ReadMode::LiveLongPoll).await?;
    if !batch.rows.is_empty() {
        return respond(batch);
    }

    let mut receiver = state.session_log.subscribe(session_id);
    let mut rows = Vec::new();
    let mut next_offset = batch.next_offset;
    let deadline = tokio::time::Instant::now() + LONG_POLL_TIMEOUT;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, receiver.recv()).await {
            Ok(Ok(row)) => {
                next_offset = row.offset.next();
                rows.push(row);
            }
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }

    if rows.is_empty() {
        let mut headers = HeaderMap::new();
        let (name, value) = header("stream-next-offset", next_offset);
        headers.insert(name, value);
        return Ok((StatusCode::NO_CONTENT, headers).into_response());
    }

    respond(ReadBatch { rows, next_offset, up_to_date: true })
}

/// SSE: backlog rows followed by everything appended after the call,
/// unbounded, one `data:` event per row.
async fn sse_stream(state: &AppState, session_id: Uuid, from_offset: Option<Offset>) -> Result<Response, ApiError> {
    let batch = state.session_log.read(session_id, from_offset, ReadMode::LiveSse).await?;
    let receiver = state.session_log.subscribe(session_id);

    let backlog = stream::iter(batch.rows);
    let live = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });

    let events = backlog.chain(live).filter_map(|row: StoredRow| async move {
        let chunk: Chunk = serde_json::from_slice(&row.bytes).ok()?;
        let wire = to_wire_row(chunk).ok()?;
        let json = serde_json::to_string(&wire).ok()?;
        Some(Ok::<Event, Infallible>(Event::default().data(json)))
    });

    Ok(Sse::new(events).into_response())
}

fn respond(batch: ReadBatch) -> Result<Response, ApiError> {
    let up_to_date = batch.up_to_date;
    let next_offset = batch.next_offset;
    let mut wire_rows: Vec<Value> = Vec::with_capacity(batch.rows.len());
    for row in batch.rows {
        let chunk: Chunk = serde_json::from_slice(&row.bytes).map_err(|err| ApiError::from(anyhow::Error::new(err)))?;
        wire_rows.push(serde_json::to_value(to_wire_row(chunk)?).map_err(|err| ApiError::from(anyhow::Error::new(err)))?);
    }

    let mut headers = HeaderMap::new();
    let (n1, v1) = header("stream-next-offset", next_offset);
    headers.insert(n1, v1);
    let (n2, v2) = header("stream-cursor", next_offset);
    headers.insert(n2, v2);
    let (n3, v3) = header("stream-up-to-date", up_to_date);
    headers.insert(n3, v3);

    Ok((headers, Json(wire_rows)).into_response())
}
