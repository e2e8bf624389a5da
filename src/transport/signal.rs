//! Process group signalling.

use crate::error::DebuggerError;
use crate::Result;

/// Signals used during session teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful termination request (SIGTERM).
    Terminate,
    /// Forceful kill (SIGKILL).
    Kill,
}

impl Signal {
    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// Result of a successful group signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// At least one member of the group received the signal.
    Delivered,
    /// The group no longer has any members.
    NoSuchProcess,
}

#[cfg(unix)]
fn as_pid(pid: u32) -> Option<libc::pid_t> {
    // 0 and negative values address other groups
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

/// Send `signal` to every process in group `pgid`.
///
/// A group that has already vanished is reported as
/// [`Delivery::NoSuchProcess`]; any other failure is a
/// [`DebuggerError::Signal`].
#[cfg(unix)]
pub fn signal_group(pgid: u32, signal: Signal) -> Result<Delivery> {
    let Some(raw_pgid) = as_pid(pgid) else {
        return Err(DebuggerError::Signal {
            pgid,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid process group id"),
        });
    };

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-raw_pgid, signal.raw()) };
    if rc == 0 {
        return Ok(Delivery::Delivered);
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(Delivery::NoSuchProcess)
    } else {
        Err(DebuggerError::Signal { pgid, source: err })
    }
}

#[cfg(not(unix))]
pub fn signal_group(pgid: u32, _signal: Signal) -> Result<Delivery> {
    Err(DebuggerError::Signal {
        pgid,
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process groups are only supported on unix",
        ),
    })
}

#[cfg(unix)]
fn probe(target: libc::pid_t) -> bool {
    // SAFETY: signal 0 only performs permission and existence checks.
    if unsafe { libc::kill(target, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether any process (including an unreaped zombie) remains in group `pgid`.
#[cfg(unix)]
pub fn group_alive(pgid: u32) -> bool {
    as_pid(pgid).is_some_and(|p| probe(-p))
}

#[cfg(not(unix))]
pub fn group_alive(_pgid: u32) -> bool {
    false
}

/// Whether `pid` has an entry in the process table, zombies included.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    as_pid(pid).is_some_and(probe)
}

#[cfg(not(unix))]
pub fn process_exists(_pid: u32) -> bool {
    false
}
