//! One-shot execution engine.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::command::Invocation;
use super::result::ExecutionResult;
use crate::output::OutputSanitizer;
use crate::transport::{self, signal_group, BoxedReader, BoxedWriter, ProcessTransport, Signal};
use crate::Result;

/// Default execution timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the exit status once output has ended.
const REAP_WAIT: Duration = Duration::from_secs(2);

/// Run `invocation` to completion.
///
/// The program gets its own process group. Its scripted input is written
/// and stdin closed, then stdout and stderr are read to EOF concurrently.
/// If the deadline elapses the whole group is killed and the partial
/// output is returned with `timed_out` set.
pub async fn run(invocation: &Invocation) -> Result<ExecutionResult> {
    let start = Instant::now();
    let limit = invocation.timeout.unwrap_or(DEFAULT_TIMEOUT);

    let ProcessTransport {
        stdin,
        mut stdout,
        stderr,
        exit,
    } = transport::spawn(&invocation.program, &invocation.args)?;
    let pid = exit.as_ref().map(|e| e.pid());

    let mut out = Vec::new();
    let mut err = Vec::new();
    let collected = tokio::time::timeout(limit, async {
        let (_, stdout_res, stderr_res) = tokio::join!(
            feed(stdin, invocation.stdin.as_deref()),
            stdout.read_to_end(&mut out),
            read_optional(stderr, &mut err),
        );
        stdout_res?;
        stderr_res?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    let timed_out = match collected {
        Ok(res) => {
            res?;
            false
        }
        Err(_) => {
            warn!(program = %invocation.program, ?limit, "one-shot execution timed out");
            if let Some(pgid) = pid {
                if let Err(e) = signal_group(pgid, Signal::Kill) {
                    warn!(pgid, error = %e, "failed to kill timed out process group");
                }
            }
            true
        }
    };

    let status = match exit {
        Some(mut exit) => exit.wait_timeout(REAP_WAIT).await,
        None => None,
    };
    let duration = start.elapsed();
    debug!(program = %invocation.program, ?status, ?duration, "one-shot execution finished");

    Ok(ExecutionResult {
        stdout: OutputSanitizer::strip_ansi(&out),
        stderr: OutputSanitizer::strip_ansi(&err),
        exit_code: if timed_out { None } else { status.and_then(|s| s.code()) },
        duration,
        timed_out,
    })
}

/// Write the scripted input and close stdin.
async fn feed(mut stdin: BoxedWriter, input: Option<&str>) {
    if let Some(input) = input {
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            debug!(error = %e, "program stopped reading its input");
            return;
        }
        let _ = stdin.flush().await;
    }
    // Dropping the handle closes the pipe
}

async fn read_optional(reader: Option<BoxedReader>, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    match reader {
        Some(mut reader) => reader.read_to_end(buf).await,
        None => Ok(0),
    }
}
