//! Persistent debugger sessions.
//!
//! A [`Session`] wraps one interactive debugger client process. The
//! [`SessionRegistry`] maps caller-chosen ids to sessions and pairs
//! registry membership with process liveness, and the [`IdleReaper`]
//! evicts sessions nobody has used for a while.

mod framer;
mod id;
mod reaper;
mod registry;
#[allow(clippy::module_inception)]
pub(crate) mod session;
mod state;

pub use framer::{Frame, FrameEnd, Framer, DEFAULT_PROMPT_MARKERS};
pub use id::SessionId;
pub use reaper::{IdleReaper, ReaperHandle, ReaperSettings};
pub use registry::SessionRegistry;
pub use session::{Exchange, Session, SessionInfo, SessionSettings, Target, Termination};
pub use state::{SessionState, ShutdownPhase};
