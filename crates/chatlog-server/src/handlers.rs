//! HTTP handlers for the session-level wire surface (spec §6).

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

fn stream_url(proxy_url: &str, session_id: Uuid) -> String {
    format!("{proxy_url}/v1/stream/sessions/{session_id}")
}

pub async fn put_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    state.session_log.open(session_id).await?;
    Ok(Json(SessionResponse {
        session_id,
        stream_url: stream_url(&state.proxy_url, session_id),
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    // `read` returns NotFound for a session that was never opened.
    state
        .session_log
        .read(session_id, None, chatlog_store::ReadMode::Catchup)
        .await?;
    Ok(Json(SessionResponse {
        session_id,
        stream_url: stream_url(&state.proxy_url, session_id),
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.session_log.delete(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let actor_id = req.actor_id.unwrap_or_else(|| "anonymous".to_string());
    let message_id = state
        .protocol
        .send_message(session_id, req.content, &actor_id, req.message_id, req.agent)
        .await?;
    Ok(Json(SendMessageResponse { message_id }))
}

/// Regenerate is not its own C4 operation (spec §4.4's table omits it);
/// it is modeled as appending a fresh user message, which naturally
/// triggers the same registered-agent fan-out as send-message.
pub async fn post_regenerate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RegenerateRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let actor_id = req.actor_id.unwrap_or_else(|| "anonymous".to_string());
    state
        .protocol
        .send_message(session_id, req.content, &actor_id, None, None)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn post_stop(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<StopRequest>,
) -> Result<StatusCode, ApiError> {
    state.protocol.stop_generation(session_id, req.message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_agents(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AgentsRequest>,
) -> Result<StatusCode, ApiError> {
    state.protocol.register_agents(session_id, req.agents).await?;
    Ok(StatusCode::OK)
}

pub async fn get_agents(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: state.protocol.list_agents(session_id).await,
    })
}

pub async fn delete_agent(
    State(state): State<AppState>,
    Path((session_id, agent_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    state.protocol.unregister_agent(session_id, &agent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_tool_result(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ToolResultRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .protocol
        .tool_result(session_id, &req.tool_call_id, req.output, req.error, req.message_id, "tool-runner")
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_approval(
    State(state): State<AppState>,
    Path((session_id, approval_id)): Path<(Uuid, String)>,
    Json(req): Json<ApprovalRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .protocol
        .approval_response(session_id, &approval_id, req.approved, "reviewer")
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_fork(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ForkRequest>,
) -> Result<(StatusCode, Json<ForkResponse>), ApiError> {
    let (new_session_id, offset) = state
        .protocol
        .fork(session_id, req.at_message_id, req.new_session_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ForkResponse {
            session_id: new_session_id,
            offset: offset.to_string(),
        }),
    ))
}
