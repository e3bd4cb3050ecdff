//! Entry creation replicated over every create candidate.

use std::io;
use std::path::Path;

use braid_types::Ugid;

use crate::aggregate::reduce;
use crate::clone::clone_path;
use crate::error::Result;
use crate::executor::apply_to_all;
use crate::path::parent;
use crate::policy::Op;
use crate::union::Union;

impl Union {
    pub fn mkdir(&self, caller: Ugid, path: &Path, mode: u32) -> Result<()> {
        self.create_on_all(Op::Mkdir, caller, path, |full| self.native().mkdir(full, mode))
    }

    /// Create a symlink at `link` pointing at `target`. The target is
    /// stored as given, never resolved against the union.
    pub fn symlink(&self, caller: Ugid, target: &Path, link: &Path) -> Result<()> {
        self.create_on_all(Op::Symlink, caller, link, |full| {
            self.native().symlink(target, full)
        })
    }

    /// The create policy runs on the parent directory. Each candidate gets
    /// the parent cloned from the first branch that has it, then `f`.
    fn create_on_all(
        &self,
        op: Op,
        caller: Ugid,
        path: &Path,
        mut f: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<()> {
        self.path_call(op.name(), caller, path, |config, rel| {
            let dir = parent(rel);
            let source = config.search(self.native(), dir)?;
            let candidates = config.select(op, self.native(), dir)?;
            reduce(apply_to_all(&candidates, rel, |branch, full| {
                clone_path(self.native(), source, branch, dir)?;
                f(full)
            }))
        })
    }
}
