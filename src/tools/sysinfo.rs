//! The `sysinfo` tool: CPU and memory figures of the local host, read
//! from the kernel's pseudo-files.
//!
//! Every figure is best effort. A file that cannot be read or parsed
//! leaves its fields empty instead of failing the request, so the tool
//! still answers on systems without `/proc`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{detached, ToolError};
use crate::error::DebuggerError;
use crate::output::{paginate, DEFAULT_MAX_LINES};
use crate::validation::InputValidator;

const TOOL: &str = "sysinfo";
const SEPARATOR_WIDTH: usize = 50;

/// Request body of the `sysinfo` tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SysinfoInput {
    pub max_lines: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuInfo {
    pub model: String,
    /// Physical cores per package.
    pub cores: u32,
    /// Logical processors.
    pub threads: u32,
    pub load_avg_1min: String,
    pub load_avg_5min: String,
    pub load_avg_15min: String,
    /// Busy share over the sampling window.
    pub usage_percent: Option<f64>,
}

/// Memory figures in MiB.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    pub available_mb: u64,
    pub cached_mb: u64,
    pub swap_total_mb: u64,
    pub swap_used_mb: u64,
    pub swap_free_mb: u64,
    pub usage_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub uptime: String,
    pub cpu_info: CpuInfo,
    pub memory_info: MemoryInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SysinfoOutput {
    pub host: String,
    pub info: SystemInfo,
    pub output: String,
    pub total_lines: usize,
    pub offset: usize,
    pub max_lines: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysinfoDefaults {
    pub max_lines: usize,
    /// Gap between the two `/proc/stat` samples used for CPU usage.
    /// Zero skips the usage figure.
    pub sample_interval: Duration,
    /// Directory that `proc/` and `etc/` are resolved against.
    pub root: PathBuf,
}

impl Default for SysinfoDefaults {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            sample_interval: Duration::from_secs(1),
            root: PathBuf::from("/"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SysinfoTool {
    validator: InputValidator,
    defaults: SysinfoDefaults,
}

impl SysinfoTool {
    pub fn new(defaults: SysinfoDefaults) -> Self {
        Self {
            validator: InputValidator::default(),
            defaults,
        }
    }

    pub async fn invoke(&self, input: SysinfoInput) -> Result<SysinfoOutput, ToolError> {
        let fail = |source: DebuggerError| ToolError::new(TOOL, None, source);
        self.validator
            .validate_max_lines(input.max_lines)
            .map_err(|e| fail(e.into()))?;
        let max_lines = if input.max_lines == 0 {
            self.defaults.max_lines
        } else {
            input.max_lines
        };

        info!("gathering local system information");
        let defaults = self.defaults.clone();
        let info = detached(async move { Ok::<_, DebuggerError>(gather(&defaults).await) })
            .await
            .map_err(fail)?;

        let host = "localhost".to_string();
        let report = format_report(&info, &host);
        let page = paginate(&report, input.offset, max_lines);
        let mut output = String::new();
        if let Some(header) = page.header() {
            output.push_str(&header);
            output.push_str("\n\n");
        }
        output.push_str(&page.text);

        Ok(SysinfoOutput {
            host,
            info,
            output,
            total_lines: page.total_lines,
            offset: page.offset,
            max_lines: page.max_lines,
            truncated: page.truncated,
        })
    }
}

async fn read(root: &Path, rel: &str) -> Option<String> {
    match tokio::fs::read_to_string(root.join(rel)).await {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(path = rel, error = %e, "system file not readable");
            None
        }
    }
}

async fn gather(defaults: &SysinfoDefaults) -> SystemInfo {
    let root = defaults.root.as_path();
    let mut info = SystemInfo::default();

    if let Some(text) = read(root, "proc/sys/kernel/hostname").await {
        info.hostname = text.trim().to_string();
    }
    if let Some(text) = read(root, "proc/sys/kernel/osrelease").await {
        info.kernel = text.trim().to_string();
    }
    info.os = match read(root, "etc/os-release").await.as_deref().and_then(pretty_name) {
        Some(name) => name,
        None => read(root, "proc/sys/kernel/ostype")
            .await
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| std::env::consts::OS.to_string()),
    };
    if let Some(secs) = read(root, "proc/uptime").await.as_deref().and_then(parse_uptime) {
        info.uptime = format_uptime(secs);
    }

    if let Some(text) = read(root, "proc/cpuinfo").await {
        parse_cpuinfo(&text, &mut info.cpu_info);
    }
    if let Some(text) = read(root, "proc/loadavg").await {
        parse_loadavg(&text, &mut info.cpu_info);
    }
    if !defaults.sample_interval.is_zero() {
        if let Some(first) = read(root, "proc/stat").await.as_deref().and_then(cpu_times) {
            tokio::time::sleep(defaults.sample_interval).await;
            if let Some(second) = read(root, "proc/stat").await.as_deref().and_then(cpu_times) {
                info.cpu_info.usage_percent = cpu_usage(first, second);
            }
        }
    }

    if let Some(text) = read(root, "proc/meminfo").await {
        info.memory_info = parse_meminfo(&text);
    }
    info
}

/// `PRETTY_NAME` from an os-release file, unquoted.
fn pretty_name(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn parse_uptime(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Render seconds the way `uptime -p` does.
fn format_uptime(secs: f64) -> String {
    let total = secs as u64 / 60;
    let (days, hours, minutes) = (total / 1440, total / 60 % 24, total % 60);
    let plural = |n: u64, unit: &str| format!("{n} {unit}{}", if n == 1 { "" } else { "s" });

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(plural(minutes, "minute"));
    }
    format!("up {}", parts.join(", "))
}

fn parse_cpuinfo(text: &str, cpu: &mut CpuInfo) {
    let field = |line: &str| line.split_once(':').map(|(_, v)| v.trim().to_string());
    for line in text.lines() {
        if line.starts_with("processor") {
            cpu.threads += 1;
        } else if line.starts_with("model name") && cpu.model.is_empty() {
            cpu.model = field(line).unwrap_or_default();
        } else if line.starts_with("cpu cores") && cpu.cores == 0 {
            cpu.cores = field(line).and_then(|v| v.parse().ok()).unwrap_or(0);
        }
    }
}

fn parse_loadavg(text: &str, cpu: &mut CpuInfo) {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if let [one, five, fifteen, ..] = fields.as_slice() {
        cpu.load_avg_1min = one.to_string();
        cpu.load_avg_5min = five.to_string();
        cpu.load_avg_15min = fifteen.to_string();
    }
}

/// Busy and total jiffies from the aggregate `cpu` line of `/proc/stat`.
fn cpu_times(text: &str) -> Option<(u64, u64)> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(4)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    let [user, nice, system, idle] = values.as_slice() else {
        return None;
    };
    let busy = user + nice + system;
    Some((busy, busy + idle))
}

fn cpu_usage(first: (u64, u64), second: (u64, u64)) -> Option<f64> {
    let busy = second.0.checked_sub(first.0)?;
    let total = second.1.checked_sub(first.1)?;
    if total == 0 {
        return Some(0.0);
    }
    Some(busy as f64 * 100.0 / total as f64)
}

fn parse_meminfo(text: &str) -> MemoryInfo {
    let mut mem = MemoryInfo::default();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(kb) = value.parse::<u64>() else {
            continue;
        };
        let mb = kb / 1024;
        match key {
            "MemTotal:" => mem.total_mb = mb,
            "MemFree:" => mem.free_mb = mb,
            "MemAvailable:" => mem.available_mb = mb,
            "Cached:" => mem.cached_mb = mb,
            "SwapTotal:" => mem.swap_total_mb = mb,
            "SwapFree:" => mem.swap_free_mb = mb,
            _ => {}
        }
    }

    if mem.available_mb == 0 {
        // Kernels before 3.14 have no MemAvailable
        mem.available_mb = mem.free_mb + mem.cached_mb;
    }
    mem.used_mb = mem.total_mb.saturating_sub(mem.available_mb);
    mem.swap_used_mb = mem.swap_total_mb.saturating_sub(mem.swap_free_mb);
    if mem.total_mb > 0 {
        mem.usage_percent = Some(mem.used_mb as f64 * 100.0 / mem.total_mb as f64);
    }
    mem
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{v:.1}%"))
}

fn format_report(info: &SystemInfo, host: &str) -> String {
    let cpu = &info.cpu_info;
    let mem = &info.memory_info;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "System Information for {host}:");
    let _ = writeln!(out, "{}\n", "=".repeat(SEPARATOR_WIDTH));

    let _ = writeln!(out, "General Information:");
    let _ = writeln!(out, "  Hostname: {}", info.hostname);
    let _ = writeln!(out, "  OS: {}", info.os);
    let _ = writeln!(out, "  Kernel: {}", info.kernel);
    let _ = writeln!(out, "  Uptime: {}\n", info.uptime);

    let _ = writeln!(out, "CPU Information:");
    let _ = writeln!(out, "  Model: {}", cpu.model);
    let _ = writeln!(out, "  Physical Cores: {}", cpu.cores);
    let _ = writeln!(out, "  Logical Cores: {}", cpu.threads);
    let _ = writeln!(
        out,
        "  Load Average: {} (1m), {} (5m), {} (15m)",
        cpu.load_avg_1min, cpu.load_avg_5min, cpu.load_avg_15min
    );
    if cpu.usage_percent.is_some() {
        let _ = writeln!(out, "  Current Usage: {}", percent(cpu.usage_percent));
    }
    out.push('\n');

    let _ = writeln!(out, "Memory Information:");
    let _ = writeln!(out, "  Total: {} MB", mem.total_mb);
    let _ = writeln!(out, "  Used: {} MB ({})", mem.used_mb, percent(mem.usage_percent));
    let _ = writeln!(out, "  Available: {} MB", mem.available_mb);
    let _ = writeln!(out, "  Free: {} MB", mem.free_mb);
    let _ = write!(out, "  Cached: {} MB", mem.cached_mb);

    if mem.swap_total_mb > 0 {
        let _ = writeln!(out, "\n\nSwap Information:");
        let _ = writeln!(out, "  Total: {} MB", mem.swap_total_mb);
        let _ = writeln!(out, "  Used: {} MB", mem.swap_used_mb);
        let _ = write!(out, "  Free: {} MB", mem.swap_free_mb);
    }
    out
}
