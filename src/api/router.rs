//! API router configuration.

use std::future::{Future, IntoFuture};

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_session, delve_tool, health, list_sessions, pprof_tool, root_info, sysinfo_tool,
    AppState,
};
use crate::error::DebuggerError;

/// Create the API router with default state.
pub fn create_router() -> Router {
    create_router_with_state(AppState::default())
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let tool_routes = Router::new()
        .route("/delve", post(delve_tool))
        .route("/pprof", post(pprof_tool))
        .route("/sysinfo", post(sysinfo_tool));

    let session_routes = Router::new()
        .route("/", get(list_sessions))
        .route("/{id}", delete(delete_session));

    let api_v1 = Router::new()
        .nest("/tools", tool_routes)
        .nest("/sessions", session_routes);

    Router::new()
        .route("/", get(root_info))
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Let in-flight requests finish when shutdown is requested.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            graceful_shutdown: true,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8899)
    }
}

/// Serve the API until `shutdown` resolves.
pub async fn serve_with_state<F>(config: ServerConfig, state: AppState, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_address();
    let router = create_router_with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(DebuggerError::Io)?;
    tracing::info!("Starting remote-debugger API server on {}", addr);

    let server = axum::serve(listener, router);
    let served = if config.graceful_shutdown {
        server.with_graceful_shutdown(shutdown).await
    } else {
        tokio::select! {
            res = server.into_future() => res,
            _ = shutdown => Ok(()),
        }
    };
    served.map_err(DebuggerError::Io)?;

    tracing::info!("API server stopped");
    Ok(())
}
