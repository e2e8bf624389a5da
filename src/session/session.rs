//! A live interactive debugger session.

use std::fmt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::framer::{Framer, FrameEnd, DEFAULT_PROMPT_MARKERS};
use super::{SessionId, SessionState, ShutdownPhase};
use crate::error::DebuggerError;
use crate::transport::{
    self, group_alive, signal_group, BoxedReader, BoxedWriter, Delivery, ExitWatch, LaunchSpec,
    ProcessTransport, Signal, StderrCollector,
};
use crate::Result;

/// Lines of stderr buffered between two commands.
const STDERR_BACKLOG: usize = 256;
/// Silence that ends startup banner collection.
const BANNER_QUIET: Duration = Duration::from_millis(50);
/// Upper bound on startup banner collection.
const BANNER_LIMIT: Duration = Duration::from_secs(2);
/// Silence on stderr that ends collection after a prompt.
const STDERR_QUIET: Duration = Duration::from_millis(50);
/// Upper bound on stderr collection after a prompt.
const STDERR_LIMIT: Duration = Duration::from_millis(500);
/// Interval between process group liveness probes during teardown.
const PROBE_INTERVAL: Duration = Duration::from_millis(10);
/// How long teardown waits for the reclamation task to publish a status.
const REAP_WAIT: Duration = Duration::from_secs(1);

/// Timing and protocol knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Substrings that mark the debugger's input prompt.
    pub prompt_markers: Vec<String>,
    /// Line written to ask the debugger to quit.
    pub exit_command: String,
    /// Settle delay after spawning, before the banner is drained.
    pub startup_delay: Duration,
    /// Default wait for a command's response.
    pub command_timeout: Duration,
    /// Pause after the exit directive before pipes are closed.
    pub exit_grace: Duration,
    /// How long the group gets to exit after SIGTERM.
    pub term_grace: Duration,
    /// How long the group gets to vanish after SIGKILL.
    pub kill_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            prompt_markers: DEFAULT_PROMPT_MARKERS.iter().map(|m| m.to_string()).collect(),
            exit_command: "exit".to_string(),
            startup_delay: Duration::from_millis(500),
            command_timeout: Duration::from_secs(5),
            exit_grace: Duration::from_millis(100),
            term_grace: Duration::from_secs(2),
            kill_grace: Duration::from_secs(2),
        }
    }
}

/// The remote endpoint a debugger client is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Result of one command round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Debugger output for the command.
    pub output: String,
    /// Lines the debugger wrote to stderr while answering, plus any it
    /// printed unprompted since the previous command.
    pub stderr: Vec<String>,
    /// How the response ended.
    pub end: FrameEnd,
}

impl Exchange {
    /// The response is partial; the session is still usable.
    pub fn timed_out(&self) -> bool {
        self.end == FrameEnd::TimedOut
    }

    /// The debugger closed its output while answering.
    pub fn closed(&self) -> bool {
        self.end == FrameEnd::Closed
    }

    /// Output with any stderr lines appended under an `Errors:` heading.
    pub fn text(&self) -> String {
        if self.stderr.is_empty() {
            return self.output.clone();
        }
        let mut text = self.output.clone();
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str("Errors:\n");
        text.push_str(&self.stderr.join("\n"));
        text
    }
}

/// Outcome of [`Session::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Termination {
    /// SIGTERM was ignored and the group was sent SIGKILL.
    pub forced: bool,
    /// Some member of the process group survived SIGKILL.
    pub leaked: bool,
    /// Exit status of the direct child, when it was reclaimed in time.
    pub exit_status: Option<ExitStatus>,
}

/// Point-in-time view of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub host: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub state: &'static str,
    pub idle_secs: u64,
    pub commands: u64,
}

struct SessionIo {
    writer: Option<BoxedWriter>,
    reader: Option<BoxedReader>,
    framer: Framer,
    stderr: Option<mpsc::Receiver<String>>,
}

impl SessionIo {
    /// Collect stderr lines until the stream stays quiet for `quiet`.
    ///
    /// The collector runs on its own task, so lines written just before
    /// the prompt may still be in flight when stdout is done.
    async fn collect_stderr(&mut self, quiet: Duration, limit: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        let Some(rx) = self.stderr.as_mut() else {
            return lines;
        };
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(quiet.min(remaining), rx.recv()).await {
                Ok(Some(line)) => lines.push(line),
                Ok(None) | Err(_) => break,
            }
        }
        lines
    }
}

/// One debugger client process and the streams attached to it.
///
/// Commands are serialized by an async lock that is held for the whole
/// write-then-read round-trip. State and timestamps sit behind short
/// synchronous locks so they can be inspected while a command is running.
pub struct Session {
    id: SessionId,
    target: Target,
    settings: SessionSettings,
    io: tokio::sync::Mutex<SessionIo>,
    state: Mutex<SessionState>,
    last_used: Mutex<Instant>,
    created_at: Instant,
    commands: AtomicU64,
    /// Output reached EOF or input broke.
    closed: AtomicBool,
    exit: Option<ExitWatch>,
    banner: String,
}

impl Session {
    /// Spawn the debugger client described by `launch` and attach to it.
    ///
    /// Fails with [`DebuggerError::Spawn`] if the program cannot be started
    /// or exits before the settle delay is over.
    pub async fn connect(
        id: SessionId,
        target: Target,
        launch: &LaunchSpec,
        settings: SessionSettings,
    ) -> Result<Self> {
        let args = launch.render_args(&target.host, target.port);
        let transport = transport::spawn(&launch.program, &args)?;
        let session = Self::attach(id, target, transport, settings).await?;

        if session.exit.as_ref().is_some_and(ExitWatch::has_exited) {
            let stderr = session
                .io
                .lock()
                .await
                .collect_stderr(STDERR_QUIET, STDERR_LIMIT)
                .await;
            let status = session.exit_status();
            session.terminate().await;

            let mut detail = match status {
                Some(status) => format!("debugger exited during startup ({status})"),
                None => "debugger exited during startup".to_string(),
            };
            let reason = if stderr.is_empty() {
                session.banner.clone()
            } else {
                stderr.join("\n")
            };
            if !reason.is_empty() {
                detail.push_str(": ");
                detail.push_str(&reason);
            }
            return Err(DebuggerError::Spawn {
                program: launch.program.clone(),
                source: std::io::Error::other(detail),
            });
        }

        Ok(session)
    }

    /// Attach to an already established transport.
    ///
    /// Starts stderr collection, waits the settle delay, and consumes the
    /// startup banner so it does not end up in the first response.
    pub async fn attach(
        id: SessionId,
        target: Target,
        transport: ProcessTransport,
        settings: SessionSettings,
    ) -> Result<Self> {
        let ProcessTransport {
            stdin,
            mut stdout,
            stderr,
            exit,
        } = transport;

        let stderr = stderr.map(|reader| {
            let (tx, rx) = mpsc::channel(STDERR_BACKLOG);
            StderrCollector::new(reader, tx)
                .with_label(id.as_str())
                .spawn();
            rx
        });

        if !settings.startup_delay.is_zero() {
            tokio::time::sleep(settings.startup_delay).await;
        }

        let mut framer = Framer::new(settings.prompt_markers.iter().cloned());
        let banner = framer.drain(&mut stdout, BANNER_QUIET, BANNER_LIMIT).await;

        let now = Instant::now();
        let session = Self {
            id,
            target,
            settings,
            io: tokio::sync::Mutex::new(SessionIo {
                writer: Some(stdin),
                reader: Some(stdout),
                framer,
                stderr,
            }),
            state: Mutex::new(SessionState::Unconnected),
            last_used: Mutex::new(now),
            created_at: now,
            commands: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            exit,
            banner,
        };
        session.lock_state().transition_to(SessionState::Connected)?;

        info!(
            session_id = %session.id,
            target = %session.target,
            pid = ?session.pid(),
            "debugger session connected"
        );
        Ok(session)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Process (and process group) ID of the debugger client.
    pub fn pid(&self) -> Option<u32> {
        self.exit.as_ref().map(ExitWatch::pid)
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Time of the last command answered with a prompt (or of creation).
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How long the session has been idle as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used())
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Number of commands that produced a response.
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Output printed by the debugger before the first prompt.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Exit status of the debugger client, once reclaimed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit.as_ref().and_then(ExitWatch::status)
    }

    /// Whether the debugger went away on its own: its output closed, its
    /// input broke, or its process has been reclaimed.
    pub fn is_defunct(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.exit.as_ref().is_some_and(ExitWatch::has_exited)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            host: self.target.host.clone(),
            port: self.target.port,
            pid: self.pid(),
            state: self.state().as_str(),
            idle_secs: self.idle_for(Instant::now()).as_secs(),
            commands: self.command_count(),
        }
    }

    /// Run one command and collect its response.
    ///
    /// A caller arriving while another command is in flight waits for it
    /// to finish. A timed-out response is returned as a partial
    /// [`Exchange`], not an error. Once teardown has begun, or once the
    /// debugger has gone away, every call fails with
    /// [`DebuggerError::SessionNotFound`].
    pub async fn run_command(&self, command: &str, timeout: Duration) -> Result<Exchange> {
        let mut guard = self.io.lock().await;
        if !self.state().can_execute() || self.is_defunct() {
            return Err(DebuggerError::SessionNotFound(self.id.to_string()));
        }

        let io = &mut *guard;
        let (Some(writer), Some(reader)) = (io.writer.as_mut(), io.reader.as_mut()) else {
            return Err(DebuggerError::SessionNotFound(self.id.to_string()));
        };

        debug!(session_id = %self.id, command, "sending command");
        let frame = match io.framer.send_and_wait(writer, reader, command, timeout).await {
            Ok(frame) => frame,
            Err(DebuggerError::Io(e)) => {
                warn!(session_id = %self.id, error = %e, "debugger pipe broken");
                self.closed.store(true, Ordering::Release);
                return Err(DebuggerError::SessionNotFound(self.id.to_string()));
            }
            Err(e) => return Err(e),
        };
        let stderr = io.collect_stderr(STDERR_QUIET, STDERR_LIMIT).await;
        drop(guard);

        self.commands.fetch_add(1, Ordering::Relaxed);

        match frame.end {
            FrameEnd::Prompt => self.touch(),
            FrameEnd::TimedOut => {
                debug!(session_id = %self.id, ?timeout, "command timed out waiting for prompt")
            }
            FrameEnd::Closed => {
                self.closed.store(true, Ordering::Release);
                warn!(session_id = %self.id, "debugger closed its output stream")
            }
        }

        let mut lines = frame.lines;
        let bare_prompt = |line: &String| {
            let line = line.trim();
            self.settings.prompt_markers.iter().any(|m| line == m.as_str())
        };
        if frame.end == FrameEnd::Prompt && lines.last().is_some_and(bare_prompt) {
            lines.pop();
        }

        Ok(Exchange {
            output: lines.join("\n"),
            stderr,
            end: frame.end,
        })
    }

    /// Shut the debugger down and reclaim its whole process group.
    ///
    /// Writes the exit directive, closes the pipes, then sends SIGTERM to
    /// the group and escalates to SIGKILL if the group outlives
    /// `term_grace`. Signal failures are logged, never returned. Calling
    /// this again after teardown has started is a no-op.
    pub async fn terminate(&self) -> Termination {
        {
            let mut state = self.lock_state();
            if state.is_shutting_down() {
                return Termination {
                    exit_status: self.exit_status(),
                    ..Termination::default()
                };
            }
            if let Err(e) = state.transition_to(SessionState::Terminating(ShutdownPhase::Graceful)) {
                warn!(session_id = %self.id, error = %e, "unexpected state at teardown");
            }
        }

        // Waits for any in-flight command to finish
        let mut io = self.io.lock().await;
        if let Some(mut writer) = io.writer.take() {
            let directive = format!("{}\n", self.settings.exit_command);
            match writer.write_all(directive.as_bytes()).await {
                Ok(()) => {
                    let _ = writer.flush().await;
                    tokio::time::sleep(self.settings.exit_grace).await;
                }
                Err(e) => debug!(session_id = %self.id, error = %e, "exit directive not delivered"),
            }
            let _ = writer.shutdown().await;
        }
        io.reader = None;
        io.stderr = None;
        drop(io);

        let mut outcome = Termination::default();
        if let Some(pgid) = self.pid() {
            self.signal(pgid, Signal::Terminate);
            if !wait_for_group_exit(pgid, self.settings.term_grace).await {
                warn!(session_id = %self.id, pgid, "process group ignored SIGTERM, sending SIGKILL");
                self.set_state(SessionState::Terminating(ShutdownPhase::Forced));
                outcome.forced = true;

                self.signal(pgid, Signal::Kill);
                if !wait_for_group_exit(pgid, self.settings.kill_grace).await {
                    error!(session_id = %self.id, pgid, "process group survived SIGKILL, leaking");
                    outcome.leaked = true;
                }
            }
        }

        if let Some(mut exit) = self.exit.clone() {
            outcome.exit_status = exit.wait_timeout(REAP_WAIT).await;
        }
        self.set_state(SessionState::Terminated);

        info!(
            session_id = %self.id,
            forced = outcome.forced,
            status = ?outcome.exit_status,
            "debugger session terminated"
        );
        outcome
    }

    fn signal(&self, pgid: u32, signal: Signal) {
        match signal_group(pgid, signal) {
            Ok(Delivery::Delivered) => debug!(session_id = %self.id, pgid, ?signal, "signal delivered"),
            Ok(Delivery::NoSuchProcess) => {
                debug!(session_id = %self.id, pgid, ?signal, "process group already gone")
            }
            Err(e) => error!(session_id = %self.id, pgid, error = %e, "failed to signal process group"),
        }
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        if let Err(e) = self.lock_state().transition_to(next) {
            warn!(session_id = %self.id, error = %e, "state transition rejected");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .finish()
    }
}

/// Poll until no member of `pgid` remains or `limit` elapses.
async fn wait_for_group_exit(pgid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if !group_alive(pgid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(PROBE_INTERVAL).await;
    }
}
