//! Session registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::session::{Session, SessionInfo, SessionSettings, Target, Termination};
use super::SessionId;
use crate::error::DebuggerError;
use crate::transport::{LaunchSpec, ProcessTransport};
use crate::Result;

/// Registry entry.
enum Slot {
    /// A create for this id is spawning its process.
    Connecting,
    Live(Arc<Session>),
    /// Removed from view; teardown is still reclaiming the process group.
    Closing,
}

impl Slot {
    /// The session, if it is live and its debugger is still there.
    fn visible(&self) -> Option<&Arc<Session>> {
        match self {
            Slot::Live(session) if !session.is_defunct() => Some(session),
            _ => None,
        }
    }
}

/// Thread-safe map from session ID to live session.
///
/// Membership and process liveness are paired: an entry appears only once
/// its debugger is connected and disappears only after its process group
/// has been reclaimed. In between, the id is held by a placeholder that
/// lookups treat as absent and creates treat as taken. A session whose
/// debugger exits on its own is hidden from lookups the same way and is
/// reclaimed by the next create for its id, the next command against it,
/// or the idle reaper.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Slot>>,
    launch: LaunchSpec,
    settings: SessionSettings,
}

impl SessionRegistry {
    /// Create an empty registry that launches debuggers with `launch`.
    pub fn new(launch: LaunchSpec, settings: SessionSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            launch,
            settings,
        }
    }

    pub fn launch(&self) -> &LaunchSpec {
        &self.launch
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Spawn a debugger for `target` and register it under `id`.
    ///
    /// Fails with [`DebuggerError::SessionExists`] without spawning anything
    /// if `id` is taken. A failed spawn leaves no entry behind.
    pub async fn create(&self, id: SessionId, target: Target) -> Result<Arc<Session>> {
        self.evict_defunct(id.as_str()).await?;
        let reservation = self.reserve(&id)?;
        let session = Session::connect(id, target, &self.launch, self.settings.clone()).await?;
        reservation.commit(session)
    }

    /// Register a session over an already established transport.
    pub async fn create_from_transport(
        &self,
        id: SessionId,
        target: Target,
        transport: ProcessTransport,
    ) -> Result<Arc<Session>> {
        self.evict_defunct(id.as_str()).await?;
        let reservation = self.reserve(&id)?;
        let session = Session::attach(id, target, transport, self.settings.clone()).await?;
        reservation.commit(session)
    }

    /// Look up a live session.
    pub fn get(&self, id: &str) -> Result<Arc<Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| DebuggerError::LockPoisoned)?;
        sessions
            .get(id)
            .and_then(Slot::visible)
            .map(Arc::clone)
            .ok_or_else(|| DebuggerError::SessionNotFound(id.to_string()))
    }

    /// Check if a live session is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .map(|s| s.get(id).and_then(Slot::visible).is_some())
            .unwrap_or(false)
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions
            .read()
            .map(|s| s.values().filter_map(Slot::visible).count())
            .unwrap_or(0)
    }

    /// Snapshot of every live session, ordered by id.
    pub fn list(&self) -> Result<Vec<SessionInfo>> {
        let mut infos: Vec<SessionInfo> = self
            .live()?
            .iter()
            .filter(|session| !session.is_defunct())
            .map(|session| session.info())
            .collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(infos)
    }

    /// Remove `id` and reclaim its process group.
    ///
    /// The entry is hidden immediately; the id becomes free again once
    /// teardown has finished. Concurrent callers for the same id get
    /// [`DebuggerError::SessionNotFound`].
    pub async fn remove_and_terminate(&self, id: &str) -> Result<Termination> {
        let (key, session) = self
            .begin_close(id, |_| true)?
            .ok_or_else(|| DebuggerError::SessionNotFound(id.to_string()))?;
        Ok(self.finish_close(key, session).await)
    }

    /// Reclaim `id` if its debugger has gone away on its own. Returns
    /// `None` when `id` is absent or still healthy.
    pub async fn evict_defunct(&self, id: &str) -> Result<Option<Termination>> {
        match self.begin_close(id, Session::is_defunct)? {
            Some((key, session)) => {
                info!(session_id = %key, status = ?session.exit_status(), "debugger exited on its own, evicting session");
                Ok(Some(self.finish_close(key, session).await))
            }
            None => Ok(None),
        }
    }

    /// IDs of sessions idle for longer than `threshold` as of `now`, and
    /// of sessions whose debugger has gone away.
    pub fn idle_ids(&self, now: Instant, threshold: Duration) -> Result<Vec<SessionId>> {
        Ok(self
            .live()?
            .into_iter()
            .filter(|session| reclaimable(session, now, threshold))
            .map(|session| session.id().clone())
            .collect())
    }

    /// Tear `id` down if it is still idle for longer than `threshold`.
    ///
    /// The idle check is repeated under the write lock so a session used
    /// since it was listed is left alone. A defunct session counts as idle.
    /// Returns `None` when nothing was removed.
    pub async fn remove_if_idle(
        &self,
        id: &str,
        now: Instant,
        threshold: Duration,
    ) -> Result<Option<Termination>> {
        match self.begin_close(id, |session| reclaimable(session, now, threshold))? {
            Some((key, session)) => Ok(Some(self.finish_close(key, session).await)),
            None => Ok(None),
        }
    }

    /// Terminate every live session concurrently. Returns how many were
    /// torn down.
    pub async fn shutdown_all(&self) -> Result<usize> {
        let victims: Vec<(SessionId, Arc<Session>)> = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| DebuggerError::LockPoisoned)?;
            let mut victims = Vec::new();
            for (key, slot) in sessions.iter_mut() {
                if matches!(slot, Slot::Live(_)) {
                    if let Slot::Live(session) = std::mem::replace(slot, Slot::Closing) {
                        victims.push((key.clone(), session));
                    }
                }
            }
            victims
        };

        let count = victims.len();
        if count > 0 {
            info!(count, "terminating all sessions");
        }
        join_all(
            victims
                .into_iter()
                .map(|(key, session)| self.finish_close(key, session)),
        )
        .await;
        Ok(count)
    }

    fn live(&self) -> Result<Vec<Arc<Session>>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| DebuggerError::LockPoisoned)?;
        Ok(sessions
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(session) => Some(Arc::clone(session)),
                _ => None,
            })
            .collect())
    }

    fn reserve(&self, id: &SessionId) -> Result<Reservation<'_>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| DebuggerError::LockPoisoned)?;
        if sessions.contains_key(id) {
            return Err(DebuggerError::SessionExists(id.to_string()));
        }
        sessions.insert(id.clone(), Slot::Connecting);
        Ok(Reservation {
            registry: self,
            id: id.clone(),
            armed: true,
        })
    }

    /// Swap a live entry matching `pred` for a closing placeholder.
    fn begin_close<F>(&self, id: &str, pred: F) -> Result<Option<(SessionId, Arc<Session>)>>
    where
        F: Fn(&Session) -> bool,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| DebuggerError::LockPoisoned)?;
        match sessions.remove_entry(id) {
            Some((key, Slot::Live(session))) if pred(&*session) => {
                sessions.insert(key.clone(), Slot::Closing);
                Ok(Some((key, session)))
            }
            Some((key, slot)) => {
                sessions.insert(key, slot);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn finish_close(&self, key: SessionId, session: Arc<Session>) -> Termination {
        let _release = Release {
            registry: self,
            id: key,
        };
        let outcome = session.terminate().await;
        if outcome.leaked {
            warn!(session_id = %session.id(), pid = ?session.pid(), "session removed with a leaked process group");
        }
        info!(session_id = %session.id(), "session removed");
        outcome
    }
}

fn reclaimable(session: &Session, now: Instant, threshold: Duration) -> bool {
    session.is_defunct() || session.idle_for(now) > threshold
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(LaunchSpec::default(), SessionSettings::default())
    }
}

/// Holds a `Connecting` placeholder; drops it unless committed.
struct Reservation<'a> {
    registry: &'a SessionRegistry,
    id: SessionId,
    armed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, session: Session) -> Result<Arc<Session>> {
        let session = Arc::new(session);
        match self.registry.sessions.write() {
            Ok(mut sessions) => {
                sessions.insert(self.id.clone(), Slot::Live(Arc::clone(&session)));
                self.armed = false;
                debug!(session_id = %self.id, "session registered");
                Ok(session)
            }
            Err(_) => {
                tokio::spawn(async move {
                    session.terminate().await;
                });
                Err(DebuggerError::LockPoisoned)
            }
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut sessions = self
            .registry
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(sessions.get(&self.id), Some(Slot::Connecting)) {
            sessions.remove(&self.id);
        }
    }
}

/// Frees a `Closing` placeholder once teardown is over, even if the
/// teardown future is dropped.
struct Release<'a> {
    registry: &'a SessionRegistry,
    id: SessionId,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut sessions = self
            .registry
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(sessions.get(&self.id), Some(Slot::Closing)) {
            sessions.remove(&self.id);
        }
    }
}
