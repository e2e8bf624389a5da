//! The `pprof` tool: fetch a profile with `go tool pprof -text`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{detached, ToolError};
use crate::error::DebuggerError;
use crate::execution::{self, Invocation};
use crate::output::{paginate, DEFAULT_MAX_LINES};
use crate::validation::InputValidator;

const TOOL: &str = "pprof";

/// Request body of the `pprof` tool. Empty or zero fields take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PprofInput {
    pub host: String,
    pub port: u32,
    pub profile: String,
    /// Sampling duration; only used by the CPU profile.
    pub seconds: u64,
    pub max_lines: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PprofOutput {
    pub url: String,
    pub output: String,
    pub total_lines: usize,
    pub offset: usize,
    pub max_lines: usize,
    pub truncated: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PprofDefaults {
    /// Program providing `tool pprof`.
    pub program: String,
    pub host: String,
    pub port: u16,
    pub profile: String,
    pub seconds: u64,
    pub max_lines: usize,
    pub timeout: Duration,
}

impl Default for PprofDefaults {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
            host: "localhost".to_string(),
            port: 6060,
            profile: "heap".to_string(),
            seconds: 30,
            max_lines: DEFAULT_MAX_LINES,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Profile endpoint of a Go program serving `net/http/pprof`.
pub fn profile_url(host: &str, port: u16, profile: &str, seconds: u64) -> String {
    let base = format!("http://{host}:{port}/debug/pprof/{profile}");
    if profile == "profile" {
        format!("{base}?seconds={seconds}")
    } else {
        base
    }
}

#[derive(Debug, Clone, Default)]
pub struct PprofTool {
    validator: InputValidator,
    defaults: PprofDefaults,
}

impl PprofTool {
    pub fn new(defaults: PprofDefaults) -> Self {
        Self {
            validator: InputValidator::default(),
            defaults,
        }
    }

    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = validator;
        self
    }

    pub async fn invoke(&self, input: PprofInput) -> Result<PprofOutput, ToolError> {
        let fail = |source: DebuggerError| ToolError::new(TOOL, None, source);
        let (url, max_lines, offset) = self.prepare(input).map_err(fail)?;

        let invocation = Invocation::new(self.defaults.program.as_str())
            .args(["tool", "pprof", "-text", url.as_str()])
            .timeout(self.defaults.timeout);
        let program = self.defaults.program.clone();

        info!(%url, "fetching profile");
        let result = detached(async move { execution::run(&invocation).await })
            .await
            .map_err(fail)?;

        if result.timed_out {
            return Err(fail(DebuggerError::Timeout));
        }
        // pprof reports progress on stderr, so it leads the output
        let text = format!("{}{}", result.stderr, result.stdout);
        if !result.success() {
            return Err(fail(DebuggerError::CommandFailed(format!(
                "failed to execute {program} tool pprof (exit code {}). Output: {}",
                result
                    .exit_code
                    .map_or_else(|| "none".to_string(), |c| c.to_string()),
                text.trim()
            ))));
        }

        let page = paginate(&text, offset, max_lines);
        let mut output = format!("go tool pprof output for {url}:\n");
        if let Some(header) = page.header() {
            output.push_str(&header);
            output.push('\n');
        }
        output.push('\n');
        output.push_str(page.text.trim());

        Ok(PprofOutput {
            url,
            output,
            total_lines: page.total_lines,
            offset: page.offset,
            max_lines: page.max_lines,
            truncated: page.truncated,
            exit_code: result.exit_code,
        })
    }

    fn prepare(&self, input: PprofInput) -> crate::Result<(String, usize, usize)> {
        self.validator.validate_host(&input.host)?;
        let port = self.validator.validate_port(input.port)?;
        self.validator.validate_max_lines(input.max_lines)?;
        self.validator.validate_seconds(input.seconds)?;
        let profile = if input.profile.is_empty() {
            self.defaults.profile.as_str()
        } else {
            input.profile.as_str()
        };
        self.validator.validate_profile(profile)?;

        let host = if input.host.is_empty() {
            self.defaults.host.as_str()
        } else {
            input.host.as_str()
        };
        let port = if port == 0 { self.defaults.port } else { port };
        let seconds = if input.seconds == 0 {
            self.defaults.seconds
        } else {
            input.seconds
        };
        let max_lines = if input.max_lines == 0 {
            self.defaults.max_lines
        } else {
            input.max_lines
        };

        Ok((profile_url(host, port, profile, seconds), max_lines, input.offset))
    }
}
