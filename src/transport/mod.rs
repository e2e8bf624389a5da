//! Process transport for interactive debugger clients.
//!
//! This module spawns one child process per session with independent
//! stdin/stdout/stderr pipes. Every child is placed in its own process
//! group so a single group-wide signal reaches all of its descendants,
//! and a dedicated reclamation task consumes its exit status.

mod process;
mod signal;
mod stderr;

pub use process::{spawn, BoxedReader, BoxedWriter, ExitWatch, LaunchSpec, ProcessTransport};
pub use signal::{group_alive, process_exists, signal_group, Delivery, Signal};
pub use stderr::StderrCollector;
