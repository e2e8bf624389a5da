//! Child process spawning and exit reclamation.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::DebuggerError;
use crate::Result;

/// Writer half handed to the framing layer.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Reader half handed to the framing layer.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Program and argument template used to launch a debugger client.
///
/// Arguments may contain the placeholders `{host}`, `{port}` and `{addr}`
/// (`host:port`), substituted when a session connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable name or path.
    pub program: String,
    /// Argument template.
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Create a new launch spec.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `dlv connect host:port`.
    pub fn delve() -> Self {
        Self::new("dlv", ["connect", "{addr}"])
    }

    /// Render the argument template for a target.
    pub fn render_args(&self, host: &str, port: u16) -> Vec<String> {
        let addr = format!("{host}:{port}");
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{addr}", &addr)
                    .replace("{host}", host)
                    .replace("{port}", &port)
            })
            .collect()
    }
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self::delve()
    }
}

/// Observer for the exit status published by the reclamation task.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    pid: u32,
    rx: watch::Receiver<Option<ExitStatus>>,
}

impl ExitWatch {
    /// Process ID of the child (also its process group ID).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status, if the child has already been reclaimed.
    pub fn status(&self) -> Option<ExitStatus> {
        *self.rx.borrow()
    }

    /// Whether the child has been reclaimed.
    pub fn has_exited(&self) -> bool {
        self.status().is_some()
    }

    /// Wait until the reclamation task publishes the exit status.
    ///
    /// Returns `None` if the reclamation task ended without a status.
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        let published = self.rx.wait_for(Option::is_some).await.map(|s| *s).ok();
        published.flatten().or_else(|| *self.rx.borrow())
    }

    /// Wait for the exit status for at most `limit`.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Option<ExitStatus> {
        tokio::time::timeout(limit, self.wait()).await.ok().flatten()
    }
}

/// Byte streams and process handle for one spawned child.
///
/// The transport does not buffer or interpret output.
pub struct ProcessTransport {
    /// Child's standard input.
    pub stdin: BoxedWriter,
    /// Child's standard output.
    pub stdout: BoxedReader,
    /// Child's standard error, when captured separately.
    pub stderr: Option<BoxedReader>,
    /// Exit observer; `None` for transports not backed by an OS process.
    pub exit: Option<ExitWatch>,
}

impl ProcessTransport {
    /// Build a transport over arbitrary streams with no OS process behind it.
    pub fn from_streams<W, R>(stdin: W, stdout: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: None,
            exit: None,
        }
    }

    /// Process ID of the child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.exit.as_ref().map(ExitWatch::pid)
    }
}

impl std::fmt::Debug for ProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTransport")
            .field("pid", &self.pid())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Spawn `program` with `args` in a new process group.
///
/// Fails with [`DebuggerError::Spawn`] if the executable cannot be started.
pub fn spawn(program: &str, args: &[String]) -> Result<ProcessTransport> {
    let spawn_err = |source: std::io::Error| DebuggerError::Spawn {
        program: program.to_string(),
        source,
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(spawn_err)?;

    let pid = child
        .id()
        .ok_or_else(|| spawn_err(std::io::Error::other("child exited before reporting a pid")))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| spawn_err(std::io::Error::other("stdin pipe missing")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_err(std::io::Error::other("stdout pipe missing")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_err(std::io::Error::other("stderr pipe missing")))?;

    let (tx, rx) = watch::channel(None);
    tokio::spawn(reclaim(child, pid, tx));

    info!(pid, program, ?args, "spawned debugger process");

    Ok(ProcessTransport {
        stdin: Box::new(stdin),
        stdout: Box::new(stdout),
        stderr: Some(Box::new(stderr)),
        exit: Some(ExitWatch { pid, rx }),
    })
}

/// Consume the child's exit status exactly once so no zombie is left behind.
async fn reclaim(mut child: Child, pid: u32, tx: watch::Sender<Option<ExitStatus>>) {
    match child.wait().await {
        Ok(status) => {
            debug!(pid, %status, "debugger process reclaimed");
            let _ = tx.send(Some(status));
        }
        Err(e) => error!(pid, error = %e, "failed to reclaim debugger process"),
    }
}
