//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use remote_debugger::{LaunchSpec, SessionRegistry, SessionSettings};

/// Interactive stand-in for `dlv connect`: banner, prompt without a
/// newline, a `help` listing, `hang` never answers, `exit` quits and
/// anything else is reported on stderr.
pub const FAKE_DEBUGGER: &str = r#"
echo "Type 'help' for list of commands."
printf '(dlv) '
while IFS= read -r line; do
  case "$line" in
    exit) exit 0 ;;
    help)
      echo "The following commands are available:"
      echo "    break (alias: b) ------------ Sets a breakpoint."
      echo "    continue (alias: c) --------- Run until breakpoint or program termination." ;;
    hang) continue ;;
    *) echo "Command failed: command not available" >&2 ;;
  esac
  printf '(dlv) '
done
"#;

/// Answers commands but ignores SIGTERM, the exit directive and the
/// end of its input.
pub const STUBBORN_DEBUGGER: &str = r#"
trap '' TERM
printf '(dlv) '
while IFS= read -r line; do
  echo "ignored: $line"
  printf '(dlv) '
done
while :; do sleep 1; done
"#;

pub fn launch(script: &str) -> LaunchSpec {
    LaunchSpec::new("sh", ["-c", script])
}

pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        prompt_markers: vec!["(dlv)".to_string()],
        startup_delay: Duration::from_millis(50),
        command_timeout: Duration::from_secs(5),
        term_grace: Duration::from_millis(500),
        kill_grace: Duration::from_millis(500),
        ..SessionSettings::default()
    }
}

pub fn registry(script: &str) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(launch(script), fast_settings()))
}

/// Poll until `pid` has left the process table or `limit` elapses.
pub async fn wait_gone(pid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if !remote_debugger::transport::process_exists(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
