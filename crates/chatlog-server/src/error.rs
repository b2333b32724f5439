//! Converges every crate's error enum into `anyhow::Error` at the HTTP
//! boundary (spec §7, SPEC_FULL.md §7) via layered `From` conversions.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<chatlog_session::SessionError>() {
            Some(chatlog_session::SessionError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Some(chatlog_session::SessionError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            Some(chatlog_session::SessionError::SourceNotFound(_)) => StatusCode::NOT_FOUND,
            Some(chatlog_session::SessionError::Store(chatlog_store::StoreError::NotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            Some(chatlog_session::SessionError::UpstreamFailed(_)) => StatusCode::BAD_GATEWAY,
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        log::error!("request failed: {:#}", self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}
