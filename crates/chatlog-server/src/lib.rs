//! HTTP wire surface for the durable chat session backbone (spec §6).

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod health;
pub mod state;
pub mod stream;

use axum::Router;
use axum::routing::{delete, get, post, put};
use state::AppState;
use tower_http::cors::CorsLayer;

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/sessions/{session_id}",
            put(handlers::put_session).get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/v1/sessions/{session_id}/messages", post(handlers::post_message))
        .route("/v1/sessions/{session_id}/regenerate", post(handlers::post_regenerate))
        .route("/v1/sessions/{session_id}/stop", post(handlers::post_stop))
        .route(
            "/v1/sessions/{session_id}/agents",
            post(handlers::post_agents).get(handlers::get_agents),
        )
        .route("/v1/sessions/{session_id}/agents/{agent_id}", delete(handlers::delete_agent))
        .route("/v1/sessions/{session_id}/tool-results", post(handlers::post_tool_result))
        .route("/v1/sessions/{session_id}/approvals/{approval_id}", post(handlers::post_approval))
        .route("/v1/sessions/{session_id}/fork", post(handlers::post_fork))
        .route("/v1/stream/sessions/{session_id}", get(stream::get_stream))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .route("/health/live", get(health::health_live))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
