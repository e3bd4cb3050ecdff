//! Read-only lookups answered by the first branch holding the path.

use std::path::{Path, PathBuf};

use braid_types::Ugid;
use nix::unistd::AccessFlags;

use crate::error::Result;
use crate::native::Attr;
use crate::policy::Op;
use crate::union::Union;

impl Union {
    pub fn getattr(&self, caller: Ugid, path: &Path) -> Result<Attr> {
        self.path_call(Op::Getattr.name(), caller, path, |config, rel| {
            let branch = config.select_first(Op::Getattr, self.native(), rel)?;
            Ok(self.native().lstat(&branch.join(rel))?)
        })
    }

    pub fn readlink(&self, caller: Ugid, path: &Path) -> Result<PathBuf> {
        self.path_call(Op::Readlink.name(), caller, path, |config, rel| {
            let branch = config.select_first(Op::Readlink, self.native(), rel)?;
            Ok(self.native().readlink(&branch.join(rel))?)
        })
    }

    pub fn access(&self, caller: Ugid, path: &Path, mode: AccessFlags) -> Result<()> {
        self.path_call(Op::Access.name(), caller, path, |config, rel| {
            let branch = config.select_first(Op::Access, self.native(), rel)?;
            Ok(self.native().access(&branch.join(rel), mode)?)
        })
    }
}
