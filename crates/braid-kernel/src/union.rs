//! The union: config, native access, identity and open handles in one place.
//!
//! Operations live in `ops/`; this file holds the two call shapes they are
//! built on. A path call switches identity, holds the config read lock and
//! runs the policy. A handle call looks up the open file and runs on it,
//! waiting out process-wide identity switches but never taking the config lock.

use std::io;
use std::path::Path;
use std::sync::Arc;

use braid_types::Ugid;
use tracing::{debug, debug_span};

use crate::aggregate::reduce;
use crate::config::{Config, ConfigHolder};
use crate::error::Result;
use crate::executor::apply_to_all;
use crate::handle::{FileInfo, HandleTable};
use crate::identity::IdentityContext;
use crate::native::{LocalFs, NativeFs};
use crate::path::normalize;
use crate::policy::Op;

/// A mounted union of branches.
pub struct Union {
    config: Arc<ConfigHolder>,
    native: Arc<dyn NativeFs>,
    identity: IdentityContext,
    handles: HandleTable,
}

impl Union {
    pub fn new(config: Arc<ConfigHolder>, native: Arc<dyn NativeFs>, identity: IdentityContext) -> Self {
        Self {
            config,
            native,
            identity,
            handles: HandleTable::new(),
        }
    }

    /// Union over the real filesystem, switching real process credentials.
    pub fn local(config: Config) -> Self {
        Self::new(
            Arc::new(ConfigHolder::new(config)),
            Arc::new(LocalFs),
            IdentityContext::process(),
        )
    }

    pub fn config(&self) -> &ConfigHolder {
        &self.config
    }

    pub fn native(&self) -> &dyn NativeFs {
        self.native.as_ref()
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Validate `config` against the filesystem and publish it.
    ///
    /// Blocks until every in-flight path call has let go of the old one.
    pub fn reconfigure(&self, config: Config) -> Result<Arc<Config>> {
        config.check_roots(self.native())?;
        Ok(self.config.replace(config))
    }

    /// Run `body` as `caller` with the config read-locked and `path`
    /// normalized to a union-relative path.
    ///
    /// On every exit the lock is released first, then identity restored.
    pub(crate) fn path_call<T>(
        &self,
        name: &'static str,
        caller: Ugid,
        path: &Path,
        body: impl FnOnce(&Config, &Path) -> Result<T>,
    ) -> Result<T> {
        let span = debug_span!("fs", op = name, path = %path.display(), %caller);
        let _entered = span.enter();

        let rel = normalize(path)?;
        let _identity = self.identity.enter(caller)?;
        let config = self.config.read();
        let result = body(&config, &rel);
        if let Err(e) = &result {
            debug!(errno = %e.errno(), "call failed");
        }
        result
    }

    /// Select branches for `op` and run `f` on each, folding the outcomes.
    ///
    /// `f` receives the full path of `path` on the branch.
    pub(crate) fn replicate(
        &self,
        op: Op,
        caller: Ugid,
        path: &Path,
        mut f: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<()> {
        self.path_call(op.name(), caller, path, |config, rel| {
            let candidates = config.select(op, self.native(), rel)?;
            reduce(apply_to_all(&candidates, rel, |_, full| f(full)))
        })
    }

    /// Run `f` on the open file behind `fh`. No config lock, no policy.
    ///
    /// With process-wide credentials the call waits until no path call is
    /// switched, so it runs as the service and not as someone else's caller.
    pub(crate) fn with_handle<T>(&self, fh: u64, f: impl FnOnce(&FileInfo) -> io::Result<T>) -> Result<T> {
        let info = self.handles.get(fh)?;
        let _settled = self.identity.settled();
        Ok(f(&info)?)
    }
}

impl std::fmt::Debug for Union {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Union")
            .field("config", &self.config.snapshot())
            .field("identity", &self.identity)
            .field("handles", &self.handles.len())
            .finish()
    }
}
