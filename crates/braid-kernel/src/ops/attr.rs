//! Attribute changes on every copy of a path.

use std::path::Path;

use braid_types::Ugid;

use crate::error::Result;
use crate::native::SetTime;
use crate::policy::Op;
use crate::union::Union;

impl Union {
    /// Set permission bits on every copy the chmod policy selects.
    pub fn chmod(&self, caller: Ugid, path: &Path, mode: u32) -> Result<()> {
        self.replicate(Op::Chmod, caller, path, |full| self.native().chmod(full, mode))
    }

    /// Change ownership without following a trailing symlink. `None` keeps
    /// that id.
    pub fn chown(&self, caller: Ugid, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        self.replicate(Op::Chown, caller, path, |full| self.native().lchown(full, uid, gid))
    }

    pub fn utimens(&self, caller: Ugid, path: &Path, atime: SetTime, mtime: SetTime) -> Result<()> {
        self.replicate(Op::Utimens, caller, path, |full| {
            self.native().utimens(full, atime, mtime)
        })
    }

    pub fn truncate(&self, caller: Ugid, path: &Path, size: u64) -> Result<()> {
        self.replicate(Op::Truncate, caller, path, |full| self.native().truncate(full, size))
    }
}
