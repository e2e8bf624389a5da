//! # remote-debugger
//!
//! Remote debugging and profiling tools for Go programs, served over HTTP.
//!
//! The core is a session manager for interactive debugger clients: each
//! session owns one `dlv connect` child in its own process group, frames
//! command responses by the debugger's prompt, serializes commands, and
//! reclaims the whole process group when it is disconnected or evicted
//! for idleness.
//!
//! ## Features
//!
//! - **Persistent sessions**: `connect` once, run many commands, `disconnect`
//! - **Prompt framing**: responses delimited by the `(dlv)` prompt, with
//!   timeouts that leave the session usable
//! - **Process-group teardown**: exit directive, SIGTERM, then SIGKILL
//! - **Idle eviction**: a background reaper terminates forgotten sessions
//! - **One-shot mode**: single scripted debugger runs and `go tool pprof`
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_debugger::{LaunchSpec, SessionId, SessionRegistry, SessionSettings, Target};
//!
//! #[tokio::main]
//! async fn main() -> remote_debugger::Result<()> {
//!     remote_debugger::logging::try_init().ok();
//!
//!     let registry = SessionRegistry::new(LaunchSpec::delve(), SessionSettings::default());
//!     let session = registry
//!         .create(SessionId::new("d1")?, Target::new("localhost", 2345))
//!         .await?;
//!
//!     let exchange = session
//!         .run_command("goroutines", registry.settings().command_timeout)
//!         .await?;
//!     println!("{}", exchange.text());
//!
//!     registry.remove_and_terminate("d1").await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod session;
pub mod tools;
pub mod transport;
pub mod validation;

// Re-export commonly used types
pub use error::{DebuggerError, Result};
pub use execution::{ExecutionResult, Invocation};
pub use output::{paginate, OutputSanitizer, Page};
pub use session::{
    Exchange, IdleReaper, ReaperHandle, ReaperSettings, Session, SessionId, SessionRegistry,
    SessionSettings, SessionState, Target, Termination,
};
pub use tools::{DelveTool, PprofTool, SysinfoTool, ToolError};
pub use transport::{LaunchSpec, ProcessTransport};
pub use validation::InputValidator;
