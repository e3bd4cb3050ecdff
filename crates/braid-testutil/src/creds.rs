use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use braid_kernel::{Credentials, Errno};
use braid_types::Ugid;

#[derive(Debug)]
struct Inner {
    current: Ugid,
    switches: Vec<Ugid>,
    deny: HashSet<Ugid>,
}

/// In-memory credentials.
///
/// Every `switch_to` is recorded, including ones that fail. Switching to a
/// denied identity fails with `EPERM` and leaves the current one in place.
#[derive(Debug, Clone)]
pub struct StubCredentials {
    inner: Arc<Mutex<Inner>>,
    process_wide: bool,
}

impl StubCredentials {
    pub fn new(start: Ugid) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: start,
                switches: Vec::new(),
                deny: HashSet::new(),
            })),
            process_wide: true,
        }
    }

    /// Credentials that switch per thread, so calls need not be serialized.
    pub fn per_thread(start: Ugid) -> Self {
        Self {
            process_wide: false,
            ..Self::new(start)
        }
    }

    /// Make switching to `target` fail.
    pub fn deny(&self, target: Ugid) {
        self.lock().deny.insert(target);
    }

    /// Every identity switched to, in order.
    pub fn switches(&self) -> Vec<Ugid> {
        self.lock().switches.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Credentials for StubCredentials {
    fn current(&self) -> Ugid {
        self.lock().current
    }

    fn switch_to(&self, target: Ugid) -> Result<(), Errno> {
        let mut inner = self.lock();
        inner.switches.push(target);
        if inner.deny.contains(&target) {
            return Err(Errno::EPERM);
        }
        inner.current = target;
        Ok(())
    }

    fn process_wide(&self) -> bool {
        self.process_wide
    }
}
