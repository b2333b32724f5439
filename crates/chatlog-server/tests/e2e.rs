//! End-to-end scenarios against the HTTP wire surface, driven in-process
//! through `tower::ServiceExt::oneshot` with an in-memory store and a
//! `wiremock` stand-in for the agent endpoint.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chatlog_server::build_router;
use chatlog_server::state::AppState;
use chatlog_session::{AgentOrchestrator, SessionLog, SessionProtocol};
use chatlog_store::{InMemoryStore, StreamStore};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app() -> Router {
    app_with_log().0
}

fn app_with_log() -> (Router, Arc<SessionLog>) {
    let store: Arc<dyn StreamStore> = Arc::new(InMemoryStore::new());
    let session_log = Arc::new(SessionLog::new(store.clone()));
    let orchestrator = AgentOrchestrator::new(reqwest::Client::new());
    let protocol = SessionProtocol::new(session_log.clone(), orchestrator);
    let router = build_router(AppState {
        session_log: session_log.clone(),
        protocol,
        store,
        proxy_url: "http://localhost:8787".to_string(),
    });
    (router, session_log)
}

async fn call(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, _, value) = call_with_headers(app, method, uri, body).await;
    (status, value)
}

async fn call_with_headers(
    app: &Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let body = if body.is_null() { Body::empty() } else { Body::from(body.to_string()) };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, headers, value)
}

async fn stream_rows(app: &Router, session_id: Uuid) -> Vec<Value> {
    let (status, value) = call(app, "GET", &format!("/v1/stream/sessions/{session_id}"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    value.as_array().cloned().unwrap_or_default()
}

fn chunk_type(row: &Value) -> String {
    let chunk: Value = serde_json::from_str(row["chunk"].as_str().unwrap()).unwrap();
    chunk["type"].as_str().unwrap().to_string()
}

async fn wait_for<F: Fn(&[Value]) -> bool>(app: &Router, session_id: Uuid, predicate: F) -> Vec<Value> {
    for _ in 0..100 {
        let rows = stream_rows(app, session_id).await;
        if predicate(&rows) {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true within the test's polling budget");
}

#[tokio::test]
async fn hello_then_streamed_reply() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agent"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("data: Hello\ndata:  world\ndata: [DONE]\n"),
        )
        .mount(&mock_server)
        .await;

    let app = app();
    let session_id = Uuid::new_v4();

    let (status, _) = call(&app, "PUT", &format!("/v1/sessions/{session_id}"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({
        "content": "Hello",
        "agent": {
            "id": "a1",
            "endpoint": format!("{}/agent", mock_server.uri()),
            "triggers": "all",
        }
    });
    let (status, parsed) = call(&app, "POST", &format!("/v1/sessions/{session_id}/messages"), body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(parsed.get("messageId").is_some());

    let rows = wait_for(&app, session_id, |rows| rows.iter().any(|r| chunk_type(r) == "done")).await;

    assert_eq!(chunk_type(&rows[0]), "whole-message");
    assert!(rows.iter().any(|r| chunk_type(r) == "content"));
    assert_eq!(chunk_type(rows.last().unwrap()), "done");
}

#[tokio::test]
async fn resume_after_disconnect_reads_only_new_rows() {
    let app = app();
    let session_id = Uuid::new_v4();
    call(&app, "PUT", &format!("/v1/sessions/{session_id}"), Value::Null).await;

    call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/messages"),
        json!({ "content": "first" }),
    )
    .await;

    let (status, headers, value) =
        call_with_headers(&app, "GET", &format!("/v1/stream/sessions/{session_id}"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value.as_array().unwrap().len(), 1);
    let resume_cursor = headers
        .get("stream-next-offset")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/messages"),
        json!({ "content": "second" }),
    )
    .await;

    // Resuming from the offset the prior read reported must not drop the
    // row that lands exactly on that cursor.
    let (status, value) = call(
        &app,
        "GET",
        &format!("/v1/stream/sessions/{session_id}?offset={resume_cursor}"),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = value.as_array().unwrap();
    assert_eq!(rows.len(), 1, "resuming from the reported next-offset should return the row appended after it");
}

#[tokio::test]
async fn stop_appends_stop_terminal_and_clears_active_generation() {
    let mock_server = MockServer::start().await;
    // Slow enough that the test can issue `stop` before [DONE] arrives.
    Mock::given(method("POST"))
        .and(path("/agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("data: partial\n")
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&mock_server)
        .await;

    let app = app();
    let session_id = Uuid::new_v4();
    call(&app, "PUT", &format!("/v1/sessions/{session_id}"), Value::Null).await;

    let body = json!({
        "content": "go",
        "agent": { "id": "a1", "endpoint": format!("{}/agent", mock_server.uri()), "triggers": "all" }
    });
    let (_, parsed) = call(&app, "POST", &format!("/v1/sessions/{session_id}/messages"), body).await;
    assert!(parsed.get("messageId").is_some());

    let (status, _) = call(&app, "POST", &format!("/v1/sessions/{session_id}/stop"), Value::Null).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let rows = wait_for(&app, session_id, |rows| rows.iter().any(|r| chunk_type(r) == "stop")).await;
    assert!(rows.iter().any(|r| chunk_type(r) == "stop"));
}

#[tokio::test]
async fn tool_call_then_approval_round_trip() {
    use chatlog_session::{ChunkPayload, Role, ToolCallFragment, ToolCallFunction};

    let (app, session_log) = app_with_log();
    let session_id = Uuid::new_v4();
    call(&app, "PUT", &format!("/v1/sessions/{session_id}"), Value::Null).await;

    // A tool call / approval request only ever originates from an agent's
    // stream; seed the log directly the way the orchestrator's sink would.
    let message_id = Uuid::new_v4();
    session_log
        .append(
            session_id,
            message_id,
            "assistant-1",
            Role::Assistant,
            ChunkPayload::ToolCall {
                tool_call: ToolCallFragment {
                    id: "T1".to_string(),
                    function: ToolCallFunction { name: Some("X".to_string()), arguments: "{}".to_string() },
                },
            },
        )
        .await
        .unwrap();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/tool-results"),
        json!({ "toolCallId": "T1", "output": {"ok": true} }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let rows = stream_rows(&app, session_id).await;
    assert!(rows.iter().any(|r| chunk_type(r) == "tool_result"));

    // Unknown tool call: the owner index has nothing to resolve.
    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/tool-results"),
        json!({ "toolCallId": "unknown", "output": {} }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    session_log
        .append(
            session_id,
            message_id,
            "assistant-1",
            Role::Assistant,
            ChunkPayload::ApprovalRequested {
                approval: chatlog_session::ApprovalRef { id: "AP1".to_string() },
                tool_call_id: Some("T1".to_string()),
            },
        )
        .await
        .unwrap();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/approvals/AP1"),
        json!({ "approved": true }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let rows = stream_rows(&app, session_id).await;
    assert!(rows.iter().any(|r| chunk_type(r) == "approval-response"));
}

#[tokio::test]
async fn agents_register_list_and_unregister_round_trip() {
    let app = app();
    let session_id = Uuid::new_v4();
    call(&app, "PUT", &format!("/v1/sessions/{session_id}"), Value::Null).await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/agents"),
        json!({ "agents": [{ "id": "a1", "endpoint": "http://example.invalid", "triggers": "user-messages" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, value) = call(&app, "GET", &format!("/v1/sessions/{session_id}/agents"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["agents"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, "DELETE", &format!("/v1/sessions/{session_id}/agents/a1"), Value::Null).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, value) = call(&app, "GET", &format!("/v1/sessions/{session_id}/agents"), Value::Null).await;
    assert!(value["agents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn fork_copies_log_up_to_cutoff() {
    let app = app();
    let session_id = Uuid::new_v4();
    call(&app, "PUT", &format!("/v1/sessions/{session_id}"), Value::Null).await;

    let (_, m1) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/messages"),
        json!({ "content": "one" }),
    )
    .await;
    let message_id = m1["messageId"].as_str().unwrap();

    call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/messages"),
        json!({ "content": "two" }),
    )
    .await;

    let (status, forked) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/fork"),
        json!({ "atMessageId": message_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let forked_session_id: Uuid = forked["sessionId"].as_str().unwrap().parse().unwrap();
    let rows = stream_rows(&app, forked_session_id).await;
    assert_eq!(rows.len(), 1, "fork should only copy chunks up to the cutoff message");
}

#[tokio::test]
async fn unknown_session_returns_not_found() {
    let app = app();
    let session_id = Uuid::new_v4();
    let (status, _) = call(&app, "GET", &format!("/v1/sessions/{session_id}"), Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoints_report_ok() {
    let app = app();
    let (status, _) = call(&app, "GET", "/health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", "/health/live", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", "/health/ready", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
}
