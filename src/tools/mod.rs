//! Tool invocations.
//!
//! Each tool turns one request into calls against the session registry
//! or a one-shot subprocess. Work is run on a detached task so a caller
//! that goes away cannot cancel a command halfway through a debugger
//! round-trip or leave a teardown unfinished.

mod delve;
mod pprof;
mod sysinfo;

use thiserror::Error;

use crate::error::DebuggerError;

pub use delve::{Action, DelveDefaults, DelveInput, DelveOutput, DelveStatus, DelveTool};
pub use pprof::{profile_url, PprofDefaults, PprofInput, PprofOutput, PprofTool};
pub use sysinfo::{
    CpuInfo, MemoryInfo, SysinfoDefaults, SysinfoInput, SysinfoOutput, SysinfoTool, SystemInfo,
};

/// A failed tool invocation, with enough context to decide whether to
/// reconnect.
#[derive(Debug, Error)]
#[error("{action} failed (session: {session}): {source}", session = .session_id.as_deref().unwrap_or("none"))]
pub struct ToolError {
    /// Action or tool name.
    pub action: &'static str,
    /// Session key the request resolved to, if any.
    pub session_id: Option<String>,
    #[source]
    pub source: DebuggerError,
}

impl ToolError {
    pub fn new(action: &'static str, session_id: Option<String>, source: DebuggerError) -> Self {
        Self {
            action,
            session_id,
            source,
        }
    }

    /// Machine-readable code of the underlying error.
    pub fn code(&self) -> &'static str {
        self.source.code()
    }
}

/// Run `fut` on its own task and wait for it.
async fn detached<F, T>(fut: F) -> Result<T, DebuggerError>
where
    F: std::future::Future<Output = Result<T, DebuggerError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut).await?
}
