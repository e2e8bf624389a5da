//! API request and response types.
//!
//! Tool request and response bodies live with their tools
//! ([`crate::tools`]); this module holds the envelope types.

use serde::Serialize;

use crate::error::DebuggerError;
use crate::session::{SessionInfo, Termination};
use crate::tools::ToolError;

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Action or tool that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Session the request resolved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            action: None,
            session_id: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl From<&DebuggerError> for ErrorResponse {
    fn from(e: &DebuggerError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<&ToolError> for ErrorResponse {
    fn from(e: &ToolError) -> Self {
        let response = Self::new(e.code(), e.to_string()).with_action(e.action);
        match &e.session_id {
            Some(id) => response.with_session(id.as_str()),
            None => response,
        }
    }
}

/// List sessions response.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// Number of live sessions.
    pub count: usize,
    /// Session summaries, ordered by id.
    pub sessions: Vec<SessionInfo>,
}

/// Response for a session deleted through the REST route.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteSessionResponse {
    pub session_id: String,
    /// SIGKILL was needed.
    pub forced: bool,
    /// Part of the process group survived SIGKILL.
    pub leaked: bool,
}

impl DeleteSessionResponse {
    pub fn new(session_id: impl Into<String>, termination: &Termination) -> Self {
        Self {
            session_id: session_id.into(),
            forced: termination.forced,
            leaked: termination.leaked,
        }
    }
}
