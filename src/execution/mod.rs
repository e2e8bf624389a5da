//! One-shot execution of external programs.
//!
//! Used where no persistent session is wanted: a debugger invoked for a
//! single scripted command, or a profile fetched with `go tool pprof`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use remote_debugger::execution::{run, Invocation};
//!
//! # async fn demo() -> remote_debugger::Result<()> {
//! let inv = Invocation::new("dlv")
//!     .args(["connect", "localhost:2345"])
//!     .stdin("goroutines\nexit\n")
//!     .timeout(Duration::from_secs(30));
//! let result = run(&inv).await?;
//! println!("{}", result.combined_output());
//! # Ok(())
//! # }
//! ```

mod command;
mod executor;
mod result;

pub use command::Invocation;
pub use executor::{run, DEFAULT_TIMEOUT};
pub use result::ExecutionResult;
