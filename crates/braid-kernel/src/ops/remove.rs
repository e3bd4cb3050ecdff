use std::path::Path;

use braid_types::Ugid;

use crate::error::Result;
use crate::policy::Op;
use crate::union::Union;

impl Union {
    /// Remove every selected copy of a non-directory.
    pub fn unlink(&self, caller: Ugid, path: &Path) -> Result<()> {
        self.replicate(Op::Unlink, caller, path, |full| self.native().unlink(full))
    }

    /// Remove every selected copy of an empty directory.
    pub fn rmdir(&self, caller: Ugid, path: &Path) -> Result<()> {
        self.replicate(Op::Rmdir, caller, path, |full| self.native().rmdir(full))
    }
}
