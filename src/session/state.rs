//! Session state machine.

/// Phase of an in-progress teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Exit directive written and SIGTERM sent to the process group.
    Graceful,
    /// The group ignored SIGTERM and has been sent SIGKILL.
    Forced,
}

/// Represents the lifecycle state of a debugger session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No debugger process attached yet.
    #[default]
    Unconnected,
    /// Debugger process running and accepting commands.
    Connected,
    /// Teardown in progress.
    Terminating(ShutdownPhase),
    /// Process group reclaimed; the session can never be used again.
    Terminated,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Unconnected -> Connected
    /// - Unconnected | Connected -> Terminating(Graceful)
    /// - Terminating(Graceful) -> Terminating(Forced)
    /// - Terminating(_) -> Terminated
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        use ShutdownPhase::*;
        matches!(
            (*self, target),
            (Unconnected, Connected)
                | (Unconnected | Connected, Terminating(Graceful))
                | (Terminating(Graceful), Terminating(Forced))
                | (Terminating(_), Terminated)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::DebuggerError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }

    /// Whether teardown has started or finished.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, SessionState::Terminating(_) | SessionState::Terminated)
    }

    /// Check if session can accept commands.
    pub fn can_execute(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// Label used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connected => "connected",
            SessionState::Terminating(ShutdownPhase::Graceful) => "terminating",
            SessionState::Terminating(ShutdownPhase::Forced) => "killing",
            SessionState::Terminated => "terminated",
        }
    }
}
