//! Background eviction of idle sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::SessionRegistry;

/// Sweep cadence and idle threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSettings {
    pub interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Periodically terminates sessions unused for longer than the idle
/// threshold.
///
/// [`IdleReaper::sweep_at`] performs one pass against an explicit clock
/// reading; [`IdleReaper::start`] runs passes on a fixed interval until
/// the returned handle is stopped.
#[derive(Clone)]
pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    settings: ReaperSettings,
}

impl IdleReaper {
    pub fn new(registry: Arc<SessionRegistry>, settings: ReaperSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> ReaperSettings {
        self.settings
    }

    /// One pass using the current time.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    /// One pass treating `now` as the current time. Returns the number of
    /// sessions evicted.
    ///
    /// Victims are torn down concurrently so one slow teardown does not
    /// hold up the others, and the registry lock is never held while a
    /// process is being reclaimed.
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let threshold = self.settings.idle_timeout;
        let ids = match self.registry.idle_ids(now, threshold) {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "idle sweep could not read registry");
                return 0;
            }
        };
        if ids.is_empty() {
            debug!("idle sweep: nothing to evict");
            return 0;
        }

        let results = join_all(ids.iter().map(|id| async move {
            match self.registry.remove_if_idle(id.as_str(), now, threshold).await {
                Ok(Some(_)) => {
                    info!(session_id = %id, idle_timeout = ?threshold, "evicted idle session");
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    error!(session_id = %id, error = %e, "failed to evict idle session");
                    false
                }
            }
        }))
        .await;

        results.into_iter().filter(|evicted| *evicted).count()
    }

    /// Run sweeps every `interval` on a background task.
    pub fn start(self) -> ReaperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.settings.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval = ?period, idle_timeout = ?self.settings.idle_timeout, "idle reaper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = &mut stop_rx => {
                        info!("idle reaper stopped");
                        break;
                    }
                }
            }
        });

        ReaperHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running reaper task.
pub struct ReaperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Stop the loop and wait for it to exit. A sweep in progress is
    /// allowed to finish.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "idle reaper task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}
