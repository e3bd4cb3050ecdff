use std::path::Path;

use braid_types::Ugid;
use tracing::debug;

use crate::aggregate::reduce;
use crate::clone::clone_path;
use crate::error::{errno_of, Result};
use crate::executor::apply_to_all;
use crate::path::{normalize, parent};
use crate::policy::filter::{writable, Rejections};
use crate::policy::Op;
use crate::union::Union;

impl Union {
    /// Rename `from` to `to` on every branch the rename policy picks.
    ///
    /// Once at least one branch renamed, copies of `to` left on writable
    /// branches that didn't take part are unlinked, so the old destination
    /// can't shadow the renamed file. Read-only branches are left as they are.
    pub fn rename(&self, caller: Ugid, from: &Path, to: &Path) -> Result<()> {
        let to = normalize(to)?;
        self.path_call(Op::Rename.name(), caller, from, |config, from| {
            let candidates = config.select(Op::Rename, self.native(), from)?;
            let to_dir = parent(&to);
            let source = config.search(self.native(), to_dir)?;
            reduce(apply_to_all(&candidates, from, |branch, full| {
                clone_path(self.native(), source, branch, to_dir)?;
                self.native().rename(full, &branch.join(&to))
            }))?;

            let stale = config
                .branches()
                .iter()
                .filter(|b| !candidates.iter().any(|c| c.root() == b.root()))
                .filter(|b| writable(self.native(), b, &mut Rejections::default()).is_some());
            for branch in stale {
                let target = branch.join(&to);
                if let Ok(attr) = self.native().lstat(&target) {
                    if attr.is_dir() {
                        continue;
                    }
                    if let Err(e) = self.native().unlink(&target) {
                        debug!(path = %target.display(), errno = %errno_of(&e), "stale destination kept");
                    }
                }
            }
            Ok(())
        })
    }
}
