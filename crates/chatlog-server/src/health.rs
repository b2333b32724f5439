//! `/health`, `/health/ready`, `/health/live` (spec §6).

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

/// Readiness probes the store with an idempotent `create` against a
/// sentinel session key; an unreachable store (sqlite file locked,
/// ELECTRIC_URL down) surfaces as 503 rather than a hang.
pub async fn health_ready(State(state): State<AppState>) -> StatusCode {
    match state.store.create("__health__").await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
