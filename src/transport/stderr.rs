//! Background collection of a child's standard error.
//!
//! The collector keeps the stderr pipe drained so a chatty debugger can
//! never block on a full pipe, and forwards lines to whoever frames the
//! next response.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::BoxedReader;

/// Line-oriented stderr pump.
pub struct StderrCollector {
    reader: BoxedReader,
    tx: mpsc::Sender<String>,
    label: String,
}

impl StderrCollector {
    /// Create a collector forwarding lines into `tx`.
    pub fn new(reader: BoxedReader, tx: mpsc::Sender<String>) -> Self {
        Self {
            reader,
            tx,
            label: String::new(),
        }
    }

    /// Tag log lines with a session label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Read until EOF. Lines that cannot be forwarded are dropped, but the
    /// pipe keeps being drained.
    pub async fn run(self) {
        let label = self.label;
        let tx = self.tx;
        let mut lines = BufReader::new(self.reader).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    trace!(session = %label, "stderr: {}", line);
                    match tx.try_send(line) {
                        Ok(()) | Err(TrySendError::Closed(_)) => {}
                        Err(TrySendError::Full(_)) => {
                            debug!(session = %label, "stderr backlog full, dropping line");
                        }
                    }
                }
                Ok(None) => {
                    debug!(session = %label, "stderr: EOF");
                    break;
                }
                Err(e) => {
                    error!(session = %label, "stderr read error: {}", e);
                    break;
                }
            }
        }
    }

    /// Run the collector on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
