//! Effective identity switching.
//!
//! Branch operations must be permission-checked as the calling user, not as
//! the service. [`IdentityContext::enter`] switches the effective uid/gid and
//! hands back a [`UgidGuard`]; dropping the guard switches back, whichever
//! way the call exits.
//!
//! On Linux the switch uses the per-thread filesystem ids (`setfsuid`,
//! `setfsgid`), so concurrent calls each run as their own caller. Elsewhere
//! `setegid`/`seteuid` change credentials for the whole process: while a
//! guard from such [`Credentials`] is alive no other call can enter, and
//! handle calls wait until the switch is undone (see
//! [`IdentityContext::settled`]).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use braid_types::Ugid;
use nix::errno::Errno;
#[cfg(any(target_os = "linux", target_os = "android"))]
use nix::unistd::{setfsgid, setfsuid};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use nix::unistd::{getegid, geteuid, setegid, seteuid};
use nix::unistd::{Gid, Uid};
use tracing::{debug, error};

use crate::error::{BraidError, Result};

/// Source and sink of effective credentials.
pub trait Credentials: Send + Sync {
    /// The identity currently in effect.
    fn current(&self) -> Ugid;

    /// Make `target` the effective identity.
    fn switch_to(&self, target: Ugid) -> Result<(), Errno>;

    /// True if a switch affects every thread, not just the caller's.
    fn process_wide(&self) -> bool {
        true
    }
}

/// Credentials of the running process.
///
/// Linux and Android switch the calling thread's filesystem ids only.
/// Other platforms switch the effective ids of the whole process.
///
/// Switching away from the starting identity needs root (`CAP_SETUID` and
/// `CAP_SETGID` on Linux). An unprivileged service can only serve callers
/// with its own identity; anyone else gets `EPERM` at switch time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCredentials;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Credentials for ProcessCredentials {
    fn current(&self) -> Ugid {
        // an id the kernel rejects leaves the fs id alone and reports it
        let uid = setfsuid(Uid::from_raw(u32::MAX));
        let gid = setfsgid(Gid::from_raw(u32::MAX));
        Ugid::new(uid.as_raw(), gid.as_raw())
    }

    fn switch_to(&self, target: Ugid) -> Result<(), Errno> {
        if self.current() == target {
            return Ok(());
        }
        // Neither call reports failure; read the ids back instead.
        setfsgid(Gid::from_raw(target.gid));
        setfsuid(Uid::from_raw(target.uid));
        if self.current() == target {
            Ok(())
        } else {
            Err(Errno::EPERM)
        }
    }

    fn process_wide(&self) -> bool {
        false
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl Credentials for ProcessCredentials {
    fn current(&self) -> Ugid {
        Ugid::new(geteuid().as_raw(), getegid().as_raw())
    }

    fn switch_to(&self, target: Ugid) -> Result<(), Errno> {
        let current = self.current();
        if current == target {
            return Ok(());
        }
        // Regain root first: the gid change needs it.
        if !current.is_root() {
            seteuid(Uid::from_raw(0))?;
        }
        if current.gid != target.gid {
            setegid(Gid::from_raw(target.gid))?;
        }
        if !target.is_root() {
            seteuid(Uid::from_raw(target.uid))?;
        }
        Ok(())
    }
}

/// Scoped identity override for filesystem calls.
pub struct IdentityContext {
    creds: Arc<dyn Credentials>,
    serial: Mutex<()>,
}

impl IdentityContext {
    pub fn new(creds: Arc<dyn Credentials>) -> Self {
        Self {
            creds,
            serial: Mutex::new(()),
        }
    }

    /// Context switching the real process credentials.
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessCredentials))
    }

    /// Switch to `target` until the returned guard is dropped.
    ///
    /// On failure nothing stays switched: a partial switch is rolled back
    /// before the error is returned.
    pub fn enter(&self, target: Ugid) -> Result<UgidGuard<'_>> {
        let serial = self.settled();

        let saved = self.creds.current();
        let switched = saved != target;
        if switched {
            if let Err(errno) = self.creds.switch_to(target) {
                if let Err(restore) = self.creds.switch_to(saved) {
                    error!(%saved, %restore, "failed to roll back identity switch");
                }
                return Err(BraidError::Identity { target, errno });
            }
            debug!(from = %saved, to = %target, "identity switched");
        }

        Ok(UgidGuard {
            creds: self.creds.as_ref(),
            saved,
            switched,
            _serial: serial,
        })
    }

    /// Run `body` as `target`.
    pub fn with_identity<T>(&self, target: Ugid, body: impl FnOnce() -> T) -> Result<T> {
        let _guard = self.enter(target)?;
        Ok(body())
    }

    pub fn current(&self) -> Ugid {
        self.creds.current()
    }

    /// Wait out any process-wide switch and keep others from starting.
    ///
    /// Handle calls hold this while they run so they see the service's own
    /// identity, never a path call's caller. `None` when switches are per
    /// thread and there is nothing to wait for.
    pub fn settled(&self) -> Option<MutexGuard<'_, ()>> {
        self.creds
            .process_wide()
            .then(|| self.serial.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl std::fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityContext")
            .field("current", &self.creds.current())
            .field("process_wide", &self.creds.process_wide())
            .finish()
    }
}

/// Restores the saved identity on drop.
pub struct UgidGuard<'a> {
    creds: &'a dyn Credentials,
    saved: Ugid,
    switched: bool,
    _serial: Option<MutexGuard<'a, ()>>,
}

impl UgidGuard<'_> {
    /// The identity that will be restored.
    pub fn saved(&self) -> Ugid {
        self.saved
    }
}

impl Drop for UgidGuard<'_> {
    fn drop(&mut self) {
        if !self.switched {
            return;
        }
        if let Err(errno) = self.creds.switch_to(self.saved) {
            error!(saved = %self.saved, %errno, "failed to restore identity");
        }
    }
}
