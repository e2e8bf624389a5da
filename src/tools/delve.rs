//! The `delve` tool: persistent and one-shot debugger access.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{detached, ToolError};
use crate::error::DebuggerError;
use crate::execution::{self, Invocation};
use crate::output::{paginate, Page};
use crate::session::{Exchange, SessionId, SessionRegistry, Target};
use crate::validation::InputValidator;

/// What to do with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Connect,
    Disconnect,
    #[default]
    Command,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::Command => "command",
        }
    }
}

/// Request body of the `delve` tool. Empty or zero fields take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DelveInput {
    pub host: String,
    pub port: u32,
    pub command: String,
    pub session_id: Option<String>,
    pub action: Option<Action>,
    pub max_lines: usize,
    pub offset: usize,
}

/// Outcome reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelveStatus {
    Connected,
    Disconnected,
    CommandExecuted,
    /// No prompt before the deadline; output is partial and the session
    /// is still usable.
    TimedOut,
    /// The debugger closed its output; the session should be disconnected.
    Closed,
}

/// Response body of the `delve` tool.
#[derive(Debug, Clone, Serialize)]
pub struct DelveOutput {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub action: Action,
    pub output: String,
    pub total_lines: usize,
    pub offset: usize,
    pub max_lines: usize,
    pub truncated: bool,
    pub status: DelveStatus,
}

/// Defaults applied to empty request fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelveDefaults {
    pub host: String,
    pub port: u16,
    pub command: String,
    pub max_lines: usize,
    /// Deadline for a sessionless invocation.
    pub oneshot_timeout: Duration,
}

impl Default for DelveDefaults {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2345,
            command: "help".to_string(),
            max_lines: crate::output::DEFAULT_MAX_LINES,
            oneshot_timeout: execution::DEFAULT_TIMEOUT,
        }
    }
}

/// Routes `delve` requests to the session registry.
///
/// The session key is `session_id` when given, otherwise the caller's
/// connection identity. Without either, `command` runs the debugger once
/// with a scripted input and `connect`/`disconnect` are rejected.
#[derive(Clone)]
pub struct DelveTool {
    registry: Arc<SessionRegistry>,
    validator: InputValidator,
    defaults: DelveDefaults,
}

/// A validated request with defaults applied.
struct Request {
    action: Action,
    key: Option<String>,
    target: Target,
    command: String,
    max_lines: usize,
    offset: usize,
}

impl DelveTool {
    pub fn new(registry: Arc<SessionRegistry>, defaults: DelveDefaults) -> Self {
        Self {
            registry,
            validator: InputValidator::default(),
            defaults,
        }
    }

    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one request. `caller` is the identity of the connection the
    /// request arrived on.
    pub async fn invoke(
        &self,
        input: DelveInput,
        caller: Option<&str>,
    ) -> Result<DelveOutput, ToolError> {
        let action = input.action.unwrap_or_default();
        let key = input
            .session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(caller.filter(|c| !c.trim().is_empty()))
            .map(str::to_string);
        let fail = |source: DebuggerError| ToolError::new(action.as_str(), key.clone(), source);

        let request = self.prepare(input, action, key.clone()).map_err(fail)?;
        let tool = self.clone();
        detached(async move { tool.dispatch(request).await })
            .await
            .map_err(fail)
    }

    fn prepare(
        &self,
        input: DelveInput,
        action: Action,
        key: Option<String>,
    ) -> crate::Result<Request> {
        self.validator.validate_host(&input.host)?;
        let port = self.validator.validate_port(input.port)?;
        self.validator.validate_command(&input.command)?;
        match (input.session_id.as_deref().filter(|s| !s.is_empty()), key.as_deref()) {
            (Some(id), _) => self.validator.validate_session_id(id)?,
            (None, Some(caller)) => self.validator.validate_caller_identity(caller)?,
            (None, None) => {}
        }
        self.validator.validate_max_lines(input.max_lines)?;

        if key.is_none() && action != Action::Command {
            return Err(DebuggerError::Validation(format!(
                "session_id is required for {}",
                action.as_str()
            )));
        }

        let host = if input.host.is_empty() {
            self.defaults.host.clone()
        } else {
            input.host
        };
        let port = if port == 0 { self.defaults.port } else { port };
        let command = if input.command.is_empty() {
            self.defaults.command.clone()
        } else {
            input.command
        };
        let max_lines = if input.max_lines == 0 {
            self.defaults.max_lines
        } else {
            input.max_lines
        };

        Ok(Request {
            action,
            key,
            target: Target::new(host, port),
            command,
            max_lines,
            offset: input.offset,
        })
    }

    async fn dispatch(&self, request: Request) -> crate::Result<DelveOutput> {
        let Some(key) = request.key.clone() else {
            return self.run_once(request).await;
        };
        match request.action {
            Action::Connect => self.connect(key, request).await,
            Action::Disconnect => self.disconnect(key, request).await,
            Action::Command => self.command(key, request).await,
        }
    }

    async fn connect(&self, key: String, request: Request) -> crate::Result<DelveOutput> {
        let id = SessionId::new(key.as_str())?;
        let session = self.registry.create(id, request.target.clone()).await?;

        let mut output = format!(
            "Connected to Delve debugger at {}\nSession ID: {}\nSession established. Use 'command' action to send debugging commands.",
            request.target, key
        );
        if !session.banner().is_empty() {
            output.push_str("\n\n");
            output.push_str(session.banner());
        }
        info!(session_id = %key, target = %request.target, "delve session connected");

        Ok(summary(request, key, output, DelveStatus::Connected))
    }

    async fn disconnect(&self, key: String, request: Request) -> crate::Result<DelveOutput> {
        let outcome = self.registry.remove_and_terminate(&key).await?;
        debug!(session_id = %key, forced = outcome.forced, "delve session disconnected");

        let output = format!("Disconnected Delve session: {key}");
        Ok(summary(request, key, output, DelveStatus::Disconnected))
    }

    async fn command(&self, key: String, request: Request) -> crate::Result<DelveOutput> {
        let session = match self.registry.get(&key) {
            Ok(session) => session,
            Err(e) => {
                self.evict_defunct(&key).await;
                return Err(e);
            }
        };
        let timeout = self.registry.settings().command_timeout;
        let result = session.run_command(&request.command, timeout).await;
        if session.is_defunct() {
            self.evict_defunct(&key).await;
        }
        let exchange = result?;

        let status = status_of(&exchange);
        let page = paginate(&exchange.text(), request.offset, request.max_lines);
        let mut output = format!("Session {} - Command: {}\n", key, request.command);
        match status {
            DelveStatus::TimedOut => output.push_str(&format!(
                "[No prompt within {}s; output may be partial. The session is still usable.]\n",
                timeout.as_secs_f64()
            )),
            DelveStatus::Closed => output.push_str(&format!(
                "[Debugger exited; session {key} is closed. Connect again to continue.]\n"
            )),
            _ => {}
        }
        push_page(&mut output, &page);

        let target = session.target().clone();
        Ok(paged(
            Request { target, ..request },
            Some(key),
            output,
            &page,
            status,
        ))
    }

    /// Drop `key` from the registry if its debugger has gone away.
    async fn evict_defunct(&self, key: &str) {
        match self.registry.evict_defunct(key).await {
            Ok(Some(outcome)) => {
                info!(session_id = %key, status = ?outcome.exit_status, "removed session of exited debugger")
            }
            Ok(None) => {}
            Err(e) => warn!(session_id = %key, error = %e, "could not remove session of exited debugger"),
        }
    }

    async fn run_once(&self, request: Request) -> crate::Result<DelveOutput> {
        let launch = self.registry.launch();
        let exit = &self.registry.settings().exit_command;
        let invocation = Invocation::new(launch.program.as_str())
            .args(launch.render_args(&request.target.host, request.target.port))
            .stdin(format!("{}\n{}\n", request.command, exit))
            .timeout(self.defaults.oneshot_timeout);

        info!(target = %request.target, command = %request.command, "running one-shot delve command");
        let result = execution::run(&invocation).await?;

        if !result.timed_out && !result.success() && !result.stderr.is_empty() {
            let code = result
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(DebuggerError::CommandFailed(format!(
                "{} exited with {}: {}",
                launch.program,
                code,
                result.stderr.trim()
            )));
        }

        let page = paginate(&result.combined_output(), request.offset, request.max_lines);
        let mut output = format!(
            "Delve debugger output for {} (command: {}):\n",
            request.target, request.command
        );
        push_page(&mut output, &page);

        let status = if result.timed_out {
            DelveStatus::TimedOut
        } else {
            DelveStatus::CommandExecuted
        };
        Ok(paged(request, None, output, &page, status))
    }
}

fn status_of(exchange: &Exchange) -> DelveStatus {
    if exchange.timed_out() {
        DelveStatus::TimedOut
    } else if exchange.closed() {
        DelveStatus::Closed
    } else {
        DelveStatus::CommandExecuted
    }
}

fn push_page(output: &mut String, page: &Page) {
    if let Some(header) = page.header() {
        output.push_str(&header);
        output.push('\n');
    }
    output.push('\n');
    output.push_str(page.text.trim());
}

fn paged(
    request: Request,
    session_id: Option<String>,
    output: String,
    page: &Page,
    status: DelveStatus,
) -> DelveOutput {
    DelveOutput {
        host: request.target.host,
        port: request.target.port,
        command: request.command,
        session_id,
        action: request.action,
        output,
        total_lines: page.total_lines,
        offset: page.offset,
        max_lines: page.max_lines,
        truncated: page.truncated,
        status,
    }
}

fn summary(request: Request, key: String, output: String, status: DelveStatus) -> DelveOutput {
    let page = paginate(&output, 0, request.max_lines);
    DelveOutput {
        command: String::new(),
        ..paged(request, Some(key), output, &page, status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::session::session::tests::{fake_launch, fast_settings, FAKE_DEBUGGER};

    fn tool() -> DelveTool {
        let registry = Arc::new(SessionRegistry::new(
            fake_launch(FAKE_DEBUGGER),
            fast_settings(),
        ));
        DelveTool::new(registry, DelveDefaults::default())
    }

    fn input(action: Action, session_id: &str, command: &str) -> DelveInput {
        DelveInput {
            session_id: Some(session_id.to_string()),
            action: Some(action),
            command: command.to_string(),
            ..DelveInput::default()
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let tool = tool();

        let out = tool.invoke(input(Action::Connect, "d1", ""), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::Connected);
        assert_eq!(out.host, "localhost");
        assert_eq!(out.port, 2345);
        assert!(out.output.starts_with("Connected to Delve debugger at localhost:2345\nSession ID: d1"));

        let out = tool.invoke(input(Action::Command, "d1", "help"), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::CommandExecuted);
        assert!(out.output.starts_with("Session d1 - Command: help\n"));
        assert!(out.output.contains("Sets a breakpoint."));

        let out = tool.invoke(input(Action::Disconnect, "d1", ""), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::Disconnected);
        assert_eq!(out.output, "Disconnected Delve session: d1");

        let err = tool
            .invoke(input(Action::Command, "d1", "help"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
        assert_eq!(err.action, "command");
        assert_eq!(err.session_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_caller_identity_is_session_key() {
        let tool = tool();
        let connect = DelveInput {
            action: Some(Action::Connect),
            ..DelveInput::default()
        };
        let out = tool.invoke(connect, Some("mcp-7f3a")).await.unwrap();
        assert_eq!(out.session_id.as_deref(), Some("mcp-7f3a"));
        assert!(tool.registry().contains("mcp-7f3a"));

        // Default action is command, default command is help
        let out = tool.invoke(DelveInput::default(), Some("mcp-7f3a")).await.unwrap();
        assert!(out.output.contains("Command: help"));

        tool.registry().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_key_rejected() {
        let tool = tool();
        let connect = DelveInput {
            action: Some(Action::Connect),
            ..DelveInput::default()
        };
        let err = tool.invoke(connect, None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(tool.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let tool = tool();
        let bad_port = DelveInput {
            port: 70000,
            ..input(Action::Connect, "d1", "")
        };
        let err = tool.invoke(bad_port, None).await.unwrap_err();
        assert!(err.source.to_string().starts_with("validation error"));

        let bad_id = input(Action::Connect, "not/alnum", "");
        assert_eq!(tool.invoke(bad_id, None).await.unwrap_err().code(), "VALIDATION_ERROR");
        assert_eq!(tool.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_connect() {
        let tool = tool();
        tool.invoke(input(Action::Connect, "d1", ""), None).await.unwrap();
        let err = tool.invoke(input(Action::Connect, "d1", ""), None).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_EXISTS");

        let out = tool.invoke(input(Action::Command, "d1", "help"), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::CommandExecuted);
        tool.registry().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_pagination_of_command_output() {
        let tool = tool();
        tool.invoke(input(Action::Connect, "p1", ""), None).await.unwrap();

        let paged_input = DelveInput {
            max_lines: 1,
            offset: 1,
            ..input(Action::Command, "p1", "help")
        };
        let out = tool.invoke(paged_input, None).await.unwrap();
        assert!(out.truncated);
        assert_eq!(out.offset, 1);
        assert_eq!(out.max_lines, 1);
        assert!(out.output.contains("[Showing lines 2-2 of 3 total lines."));
        assert!(out.output.ends_with("break (alias: b) ------------ Sets a breakpoint."));

        tool.registry().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_reports_partial() {
        let registry = Arc::new(SessionRegistry::new(
            fake_launch(FAKE_DEBUGGER),
            crate::session::SessionSettings {
                command_timeout: Duration::from_millis(200),
                ..fast_settings()
            },
        ));
        let tool = DelveTool::new(registry, DelveDefaults::default());
        tool.invoke(input(Action::Connect, "t1", ""), None).await.unwrap();

        let out = tool.invoke(input(Action::Command, "t1", "hang"), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::TimedOut);
        assert!(out.output.contains("still usable"));

        let out = tool.invoke(input(Action::Command, "t1", "help"), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::CommandExecuted);
        tool.registry().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_debugger_exit_closes_session() {
        let tool = tool();
        tool.invoke(input(Action::Connect, "q1", ""), None).await.unwrap();
        let pid = tool.registry().get("q1").unwrap().pid().unwrap();

        let out = tool.invoke(input(Action::Command, "q1", "exit"), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::Closed);
        assert!(out.output.contains("[Debugger exited; session q1 is closed."));
        assert_eq!(tool.registry().count(), 0);
        assert!(!crate::transport::process_exists(pid));

        let err = tool
            .invoke(input(Action::Command, "q1", "help"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");

        let out = tool.invoke(input(Action::Connect, "q1", ""), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::Connected);
        tool.registry().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_bogus_command_reports_its_error() {
        let tool = tool();
        tool.invoke(input(Action::Connect, "b1", ""), None).await.unwrap();

        let out = tool.invoke(input(Action::Command, "b1", "boguscmd"), None).await.unwrap();
        assert_eq!(out.status, DelveStatus::CommandExecuted);
        assert!(out.output.contains("Errors:\nCommand failed: command not available"));

        let out = tool.invoke(input(Action::Command, "b1", "help"), None).await.unwrap();
        assert!(!out.output.contains("Command failed"));
        tool.registry().shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_caller_identity_is_validated() {
        let tool = tool();
        let connect = DelveInput {
            action: Some(Action::Connect),
            ..DelveInput::default()
        };
        let err = tool.invoke(connect.clone(), Some("has space")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = tool.invoke(connect, Some(&"x".repeat(65))).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(tool.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_one_shot_without_session() {
        let tool = tool();
        let out = tool.invoke(DelveInput::default(), None).await.unwrap();
        assert!(out.session_id.is_none());
        assert_eq!(out.status, DelveStatus::CommandExecuted);
        assert!(out
            .output
            .starts_with("Delve debugger output for localhost:2345 (command: help):\n"));
        assert!(out.output.contains("continue (alias: c)"));
        assert_eq!(tool.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_one_shot_failure_is_error() {
        let registry = Arc::new(SessionRegistry::new(
            fake_launch("echo 'could not attach' >&2; exit 1"),
            fast_settings(),
        ));
        let tool = DelveTool::new(registry, DelveDefaults::default());
        let err = tool.invoke(DelveInput::default(), None).await.unwrap_err();
        assert_eq!(err.code(), "COMMAND_FAILED");
        assert!(err.source.to_string().contains("could not attach"));
    }

    #[test]
    fn test_action_serde() {
        let input: DelveInput =
            serde_json::from_str(r#"{"action": "disconnect", "session_id": "d1"}"#).unwrap();
        assert_eq!(input.action, Some(Action::Disconnect));
        assert!(serde_json::from_str::<DelveInput>(r#"{"action": "explode"}"#).is_err());

        let json = serde_json::to_string(&DelveStatus::CommandExecuted).unwrap();
        assert_eq!(json, "\"command_executed\"");
    }
}
