//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::types::{DeleteSessionResponse, ErrorResponse, ListSessionsResponse};
use crate::error::DebuggerError;
use crate::session::SessionRegistry;
use crate::tools::{
    DelveDefaults, DelveInput, DelveOutput, DelveTool, PprofDefaults, PprofInput, PprofOutput,
    PprofTool, SysinfoDefaults, SysinfoInput, SysinfoOutput, SysinfoTool, ToolError,
};

/// Header carrying the caller's connection identity.
pub const CALLER_HEADER: &str = "mcp-session-id";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub delve: DelveTool,
    pub pprof: PprofTool,
    pub sysinfo: SysinfoTool,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, delve: DelveDefaults, pprof: PprofDefaults) -> Self {
        Self {
            delve: DelveTool::new(Arc::clone(&registry), delve),
            pprof: PprofTool::new(pprof),
            sysinfo: SysinfoTool::default(),
            registry,
        }
    }

    pub fn with_sysinfo(mut self, defaults: SysinfoDefaults) -> Self {
        self.sysinfo = SysinfoTool::new(defaults);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            Arc::new(SessionRegistry::default()),
            DelveDefaults::default(),
            PprofDefaults::default(),
        )
    }
}

/// HTTP status for a core error.
pub fn status_for(e: &DebuggerError) -> StatusCode {
    match e {
        DebuggerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        DebuggerError::SessionExists(_) => StatusCode::CONFLICT,
        DebuggerError::Validation(_) => StatusCode::BAD_REQUEST,
        DebuggerError::Spawn { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn tool_error(e: ToolError) -> ApiError {
    tracing::warn!(action = e.action, session_id = ?e.session_id, error = %e.source, "tool call failed");
    (status_for(&e.source), Json(ErrorResponse::from(&e)))
}

fn core_error(e: DebuggerError) -> ApiError {
    (status_for(&e), Json(ErrorResponse::from(&e)))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// Service information endpoint.
pub async fn root_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "remote-debugger",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "delve": "/api/v1/tools/delve",
            "pprof": "/api/v1/tools/pprof",
            "sysinfo": "/api/v1/tools/sysinfo",
            "sessions": "/api/v1/sessions"
        }
    }))
}

/// Run the `delve` tool. The caller header keys the session when the
/// body has no `session_id`.
pub async fn delve_tool(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<DelveInput>,
) -> Result<Json<DelveOutput>, ApiError> {
    let caller = headers.get(CALLER_HEADER).and_then(|v| v.to_str().ok());
    state.delve.invoke(input, caller).await.map(Json).map_err(tool_error)
}

/// Run the `pprof` tool.
pub async fn pprof_tool(
    State(state): State<AppState>,
    Json(input): Json<PprofInput>,
) -> Result<Json<PprofOutput>, ApiError> {
    state.pprof.invoke(input).await.map(Json).map_err(tool_error)
}

/// Run the `sysinfo` tool.
pub async fn sysinfo_tool(
    State(state): State<AppState>,
    Json(input): Json<SysinfoInput>,
) -> Result<Json<SysinfoOutput>, ApiError> {
    state.sysinfo.invoke(input).await.map(Json).map_err(tool_error)
}

/// List live sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let sessions = state.registry.list().map_err(core_error)?;
    Ok(Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

/// Terminate and remove a session.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, ApiError> {
    let registry = Arc::clone(&state.registry);
    let id = session_id.clone();
    let termination = tokio::spawn(async move { registry.remove_and_terminate(&id).await })
        .await
        .map_err(|e| core_error(e.into()))?
        .map_err(core_error)?;

    Ok(Json(DeleteSessionResponse::new(session_id, &termination)))
}
