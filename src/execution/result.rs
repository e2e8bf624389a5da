//! Execution result types.

use std::time::Duration;

/// Result of a one-shot execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Standard output, ANSI codes stripped.
    pub stdout: String,
    /// Standard error, ANSI codes stripped.
    pub stderr: String,
    /// Exit code, if the program exited normally in time.
    pub exit_code: Option<i32>,
    /// Wall-clock run time.
    pub duration: Duration,
    /// Whether the deadline elapsed and the process group was killed.
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Check if the program exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Check if the program failed (non-zero exit, killed, or timeout).
    pub fn failed(&self) -> bool {
        self.timed_out || self.exit_code != Some(0)
    }

    /// Standard output with standard error appended under `Errors:`.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        format!("{}\nErrors:\n{}", self.stdout, self.stderr)
    }

    /// Get output lines.
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}
