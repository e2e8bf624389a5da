//! API integration tests.
//!
//! These tests drive the complete router with axum's test utilities. The
//! debugger is a `sh` script that speaks the prompt protocol.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use remote_debugger::api::{create_router, create_router_with_state, AppState, CALLER_HEADER};
use remote_debugger::tools::{DelveDefaults, PprofDefaults, SysinfoDefaults};
use remote_debugger::SessionRegistry;

/// Helper to create a JSON request.
fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to extract body as string.
async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).to_string()
}

/// Helper to extract JSON from response.
async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

fn fake_state(script: &str) -> AppState {
    let registry: Arc<SessionRegistry> = common::registry(script);
    AppState::new(registry, DelveDefaults::default(), PprofDefaults::default())
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, response_json(response).await)
}

async fn delve(app: &Router, body: Value) -> (StatusCode, Value) {
    call(app, json_request(Method::POST, "/api/v1/tools/delve", Some(body))).await
}

// ============================================================================
// Health & Info Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_router();

    let response = app
        .oneshot(json_request(Method::GET, "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "OK");
}

#[tokio::test]
async fn test_root_info_endpoint() {
    let app = create_router();

    let response = app
        .oneshot(json_request(Method::GET, "/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["service"], "remote-debugger");
    assert_eq!(json["endpoints"]["pprof"], "/api/v1/tools/pprof");
}

// ============================================================================
// Debugger Tool Tests
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_delve_session_round_trip() {
    let state = fake_state(common::FAKE_DEBUGGER);
    let registry = Arc::clone(&state.registry);
    let app = create_router_with_state(state);

    let (status, json) = delve(&app, json!({"action": "connect", "session_id": "d1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "connected");
    assert_eq!(json["session_id"], "d1");
    assert_eq!(json["port"], 2345);
    assert!(registry.contains("d1"));

    let (status, json) = call(&app, json_request(Method::GET, "/api/v1/sessions", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["sessions"][0]["session_id"], "d1");
    assert_eq!(json["sessions"][0]["state"], "connected");

    let (status, json) = delve(&app, json!({"session_id": "d1", "command": "help"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "command_executed");
    assert_eq!(json["action"], "command");
    assert!(json["output"].as_str().unwrap().contains("Sets a breakpoint."));

    let (status, json) = delve(&app, json!({"action": "disconnect", "session_id": "d1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"], "Disconnected Delve session: d1");
    assert_eq!(registry.count(), 0);

    let (status, json) = delve(&app, json!({"session_id": "d1", "command": "help"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SESSION_NOT_FOUND");
    assert_eq!(json["action"], "command");
    assert_eq!(json["session_id"], "d1");
}

#[cfg(unix)]
#[tokio::test]
async fn test_delve_duplicate_connect_conflicts() {
    let state = fake_state(common::FAKE_DEBUGGER);
    let registry = Arc::clone(&state.registry);
    let app = create_router_with_state(state);

    let body = json!({"action": "connect", "session_id": "dup"});
    let (status, _) = delve(&app, body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = delve(&app, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "SESSION_EXISTS");
    assert_eq!(registry.count(), 1);

    registry.shutdown_all().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_delve_caller_header_keys_session() {
    let state = fake_state(common::FAKE_DEBUGGER);
    let registry = Arc::clone(&state.registry);
    let app = create_router_with_state(state);

    let request = |body: Value| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/tools/delve")
            .header(header::CONTENT_TYPE, "application/json")
            .header(CALLER_HEADER, "agent-42")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (status, json) = call(&app, request(json!({"action": "connect"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["session_id"], "agent-42");

    let (status, json) = call(&app, request(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["output"]
        .as_str()
        .unwrap()
        .starts_with("Session agent-42 - Command: help"));

    let response = app
        .clone()
        .oneshot(json_request(Method::DELETE, "/api/v1/sessions/agent-42", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["forced"], false);
    assert_eq!(registry.count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_delve_exited_debugger_is_not_found() {
    let state = fake_state(common::FAKE_DEBUGGER);
    let registry = Arc::clone(&state.registry);
    let app = create_router_with_state(state);

    let (status, _) = delve(&app, json!({"action": "connect", "session_id": "q1"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = delve(&app, json!({"session_id": "q1", "command": "exit"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "closed");
    assert_eq!(registry.count(), 0);

    let (status, json) = delve(&app, json!({"session_id": "q1", "command": "help"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SESSION_NOT_FOUND");

    let (status, _) = delve(&app, json!({"action": "connect", "session_id": "q1"})).await;
    assert_eq!(status, StatusCode::OK);
    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_delve_caller_header_is_validated() {
    let app = create_router_with_state(fake_state("exit 0"));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/tools/delve")
        .header(header::CONTENT_TYPE, "application/json")
        .header(CALLER_HEADER, "x".repeat(80))
        .body(Body::from(json!({"action": "connect"}).to_string()))
        .unwrap();
    let (status, json) = call(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_delve_validation_errors() {
    let app = create_router_with_state(fake_state("exit 0"));

    let (status, json) = delve(&app, json!({"action": "connect", "session_id": "d1", "port": 70000})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["action"], "connect");

    let (status, _) = delve(&app, json!({"session_id": "d1", "command": "help\nexit"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = delve(&app, json!({"action": "disconnect"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("session_id is required"));
}

#[tokio::test]
async fn test_delve_spawn_failure_is_bad_gateway() {
    let registry = Arc::new(SessionRegistry::new(
        remote_debugger::LaunchSpec::new("/nonexistent/dlv", ["connect", "{addr}"]),
        common::fast_settings(),
    ));
    let state = AppState::new(Arc::clone(&registry), DelveDefaults::default(), PprofDefaults::default());
    let app = create_router_with_state(state);

    let (status, json) = delve(&app, json!({"action": "connect", "session_id": "d1"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "SPAWN_FAILED");
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_delete_unknown_session() {
    let app = create_router();

    let (status, json) = call(
        &app,
        json_request(Method::DELETE, "/api/v1/sessions/nobody", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_list_sessions_empty() {
    let app = create_router();

    let (status, json) = call(&app, json_request(Method::GET, "/api/v1/sessions", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert!(json["sessions"].as_array().unwrap().is_empty());
}

// ============================================================================
// Profile Tool Tests
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_pprof_invalid_profile() {
    let app = create_router();

    let (status, json) = call(
        &app,
        json_request(
            Method::POST,
            "/api/v1/tools/pprof",
            Some(json!({"profile": "../etc/passwd"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["action"], "pprof");
}

#[cfg(unix)]
#[tokio::test]
async fn test_pprof_runs_configured_program() {
    let registry = common::registry(common::FAKE_DEBUGGER);
    let pprof = PprofDefaults {
        program: "echo".to_string(),
        ..PprofDefaults::default()
    };
    let app = create_router_with_state(AppState::new(registry, DelveDefaults::default(), pprof));

    let (status, json) = call(
        &app,
        json_request(
            Method::POST,
            "/api/v1/tools/pprof",
            Some(json!({"profile": "goroutine", "port": 7070})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"], "http://localhost:7070/debug/pprof/goroutine");
    assert_eq!(json["exit_code"], 0);
}

// ============================================================================
// System Inspection Tests
// ============================================================================

#[tokio::test]
async fn test_sysinfo_reports_local_host() {
    let state = AppState::default().with_sysinfo(SysinfoDefaults {
        sample_interval: std::time::Duration::ZERO,
        ..SysinfoDefaults::default()
    });
    let app = create_router_with_state(state);

    let (status, json) = call(
        &app,
        json_request(Method::POST, "/api/v1/tools/sysinfo", Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["host"], "localhost");
    assert!(json["output"]
        .as_str()
        .unwrap()
        .starts_with("System Information for localhost:"));
    assert!(json["info"]["memory_info"]["total_mb"].is_u64());
}

#[tokio::test]
async fn test_sysinfo_rejects_huge_page() {
    let app = create_router();

    let (status, json) = call(
        &app,
        json_request(
            Method::POST,
            "/api/v1/tools/sysinfo",
            Some(json!({"max_lines": 500000})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["action"], "sysinfo");
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn test_invalid_json_body() {
    let app = create_router();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/tools/delve")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ invalid json }"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_action_rejected() {
    let app = create_router();

    let (status, _) = delve(&app, json!({"action": "explode"})).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_method_not_allowed() {
    let app = create_router();

    let response = app
        .oneshot(json_request(Method::PUT, "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_not_found_route() {
    let app = create_router();

    let response = app
        .oneshot(json_request(Method::GET, "/nonexistent", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
