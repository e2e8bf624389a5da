//! Error types for remote-debugger.

use thiserror::Error;

/// Main error type for remote-debugger operations.
#[derive(Error, Debug)]
pub enum DebuggerError {
    /// Session with the given ID was not found.
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// Session with the given ID already exists.
    #[error("session {0} already exists")]
    SessionExists(String),

    /// The debugger client process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A signal could not be delivered to a process group.
    #[error("failed to signal process group {pgid}: {source}")]
    Signal {
        pgid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// Tool input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One-shot execution exceeded its deadline.
    #[error("command timed out")]
    Timeout,

    /// The external command ran but reported failure.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// A detached task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl DebuggerError {
    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExists(_) => "SESSION_EXISTS",
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::Signal { .. } => "SIGNAL_FAILED",
            Self::InvalidStateTransition { .. } => "INVALID_STATE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Timeout => "TIMED_OUT",
            Self::CommandFailed(_) => "COMMAND_FAILED",
            Self::LockPoisoned | Self::Task(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<tokio::task::JoinError> for DebuggerError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Convenience Result type for remote-debugger operations.
pub type Result<T> = std::result::Result<T, DebuggerError>;
