//! HTTP binding for the debugging tools.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /` - Service information
//! - `POST /api/v1/tools/delve` - Debugger tool (`connect`, `command`, `disconnect`)
//! - `POST /api/v1/tools/pprof` - Profile tool
//! - `POST /api/v1/tools/sysinfo` - Local CPU and memory figures
//! - `GET /api/v1/sessions` - List live debugger sessions
//! - `DELETE /api/v1/sessions/{id}` - Terminate a session
//!
//! The `Mcp-Session-Id` request header identifies the caller; the
//! debugger tool uses it as the session key when the body names none.
//!
//! ## Example
//!
//! ```no_run
//! use remote_debugger::api::{serve_with_state, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> remote_debugger::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 8899);
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     serve_with_state(config, AppState::default(), shutdown).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::{status_for, AppState, CALLER_HEADER};
pub use router::{create_router, create_router_with_state, serve_with_state, ServerConfig};
pub use types::{DeleteSessionResponse, ErrorResponse, ListSessionsResponse};
