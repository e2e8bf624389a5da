//! Configuration management for remote-debugger.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{AppState, ServerConfig};
use crate::cli::Args;
use crate::session::{ReaperSettings, SessionRegistry, SessionSettings, DEFAULT_PROMPT_MARKERS};
use crate::tools::{DelveDefaults, PprofDefaults, SysinfoDefaults};
use crate::transport::LaunchSpec;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub debugger: DebuggerSection,
    pub reaper: ReaperSection,
    pub profiler: ProfilerSection,
    pub sysinfo: SysinfoSection,
    pub output: OutputSection,
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8899,
            graceful_shutdown: true,
        }
    }
}

/// Debugger client and session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerSection {
    /// Debugger client executable.
    pub program: String,
    /// Argument template; `{host}`, `{port}` and `{addr}` are substituted.
    pub args: Vec<String>,
    pub default_host: String,
    pub default_port: u16,
    pub default_command: String,
    pub prompt_markers: Vec<String>,
    pub exit_command: String,
    pub startup_delay_ms: u64,
    pub command_timeout_ms: u64,
    pub exit_grace_ms: u64,
    pub term_grace_ms: u64,
    pub kill_grace_ms: u64,
    /// Deadline of a sessionless invocation.
    pub oneshot_timeout_secs: u64,
}

impl Default for DebuggerSection {
    fn default() -> Self {
        let launch = LaunchSpec::delve();
        Self {
            program: launch.program,
            args: launch.args,
            default_host: "localhost".to_string(),
            default_port: 2345,
            default_command: "help".to_string(),
            prompt_markers: DEFAULT_PROMPT_MARKERS.iter().map(|m| m.to_string()).collect(),
            exit_command: "exit".to_string(),
            startup_delay_ms: 500,
            command_timeout_ms: 5000,
            exit_grace_ms: 100,
            term_grace_ms: 2000,
            kill_grace_ms: 2000,
            oneshot_timeout_secs: 30,
        }
    }
}

/// Idle session eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperSection {
    pub enabled: bool,
    pub interval_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for ReaperSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            idle_timeout_secs: 1800,
        }
    }
}

/// `go tool pprof` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerSection {
    pub program: String,
    pub default_host: String,
    pub default_port: u16,
    pub default_profile: String,
    pub default_seconds: u64,
    pub timeout_secs: u64,
}

impl Default for ProfilerSection {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
            default_host: "localhost".to_string(),
            default_port: 6060,
            default_profile: "heap".to_string(),
            default_seconds: 30,
            timeout_secs: 120,
        }
    }
}

/// Local system inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SysinfoSection {
    /// Gap between CPU samples; 0 skips the usage figure.
    pub sample_interval_ms: u64,
}

impl Default for SysinfoSection {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
        }
    }
}

/// Tool output pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub default_max_lines: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            default_max_lines: crate::output::DEFAULT_MAX_LINES,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("REMOTE_DEBUGGER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("REMOTE_DEBUGGER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Some(dlv) = var("REMOTE_DEBUGGER_DLV").filter(|p| !p.is_empty()) {
            self.debugger.program = dlv;
        }

        if let Some(level) = var("REMOTE_DEBUGGER_LOG_LEVEL").or_else(|| var("RUST_LOG")) {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref dlv) = args.dlv {
            self.debugger.program = dlv.clone();
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.apply_args(args);
        Ok(config)
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        Ok(ServerConfig {
            graceful_shutdown: self.server.graceful_shutdown,
            ..ServerConfig::new(host.to_string(), self.server.port)
        })
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec::new(self.debugger.program.as_str(), self.debugger.args.iter().cloned())
    }

    pub fn session_settings(&self) -> SessionSettings {
        let d = &self.debugger;
        SessionSettings {
            prompt_markers: d.prompt_markers.clone(),
            exit_command: d.exit_command.clone(),
            startup_delay: Duration::from_millis(d.startup_delay_ms),
            command_timeout: Duration::from_millis(d.command_timeout_ms),
            exit_grace: Duration::from_millis(d.exit_grace_ms),
            term_grace: Duration::from_millis(d.term_grace_ms),
            kill_grace: Duration::from_millis(d.kill_grace_ms),
        }
    }

    /// Reaper timing, or `None` when eviction is disabled.
    pub fn reaper_settings(&self) -> Option<ReaperSettings> {
        self.reaper.enabled.then(|| ReaperSettings {
            interval: Duration::from_secs(self.reaper.interval_secs.max(1)),
            idle_timeout: Duration::from_secs(self.reaper.idle_timeout_secs),
        })
    }

    pub fn delve_defaults(&self) -> DelveDefaults {
        DelveDefaults {
            host: self.debugger.default_host.clone(),
            port: self.debugger.default_port,
            command: self.debugger.default_command.clone(),
            max_lines: self.output.default_max_lines,
            oneshot_timeout: Duration::from_secs(self.debugger.oneshot_timeout_secs),
        }
    }

    pub fn pprof_defaults(&self) -> PprofDefaults {
        let p = &self.profiler;
        PprofDefaults {
            program: p.program.clone(),
            host: p.default_host.clone(),
            port: p.default_port,
            profile: p.default_profile.clone(),
            seconds: p.default_seconds,
            max_lines: self.output.default_max_lines,
            timeout: Duration::from_secs(p.timeout_secs),
        }
    }

    pub fn sysinfo_defaults(&self) -> SysinfoDefaults {
        SysinfoDefaults {
            max_lines: self.output.default_max_lines,
            sample_interval: Duration::from_millis(self.sysinfo.sample_interval_ms),
            ..SysinfoDefaults::default()
        }
    }

    /// Build the session registry and tool state described by this config.
    pub fn app_state(&self) -> AppState {
        let registry = Arc::new(SessionRegistry::new(
            self.launch_spec(),
            self.session_settings(),
        ));
        AppState::new(registry, self.delve_defaults(), self.pprof_defaults())
            .with_sysinfo(self.sysinfo_defaults())
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
        }
    }
}

impl std::error::Error for ConfigError {}
