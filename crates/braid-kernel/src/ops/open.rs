//! Calls that produce a file handle.

use std::path::Path;

use braid_types::Ugid;
use tracing::debug;

use super::{wants_direct_io, OpenReply};
use crate::clone::clone_path;
use crate::error::Result;
use crate::handle::FileInfo;
use crate::native::NativeFile;
use crate::path::parent;
use crate::policy::Op;
use crate::union::Union;

impl Union {
    /// Create and open a file on the first create candidate.
    ///
    /// Unlike `mkdir`, the file exists on one branch only. The handle stays
    /// bound to that branch until released.
    pub fn create(&self, caller: Ugid, path: &Path, flags: i32, mode: u32) -> Result<OpenReply> {
        self.path_call(Op::Create.name(), caller, path, |config, rel| {
            let dir = parent(rel);
            let source = config.search(self.native(), dir)?;
            let branch = config.select_first(Op::Create, self.native(), dir)?;
            clone_path(self.native(), source, branch, dir)?;

            let file = self.native().create(&branch.join(rel), flags, mode)?;
            Ok(self.register(file, branch.root(), flags))
        })
    }

    /// Open an existing file on the first branch the open policy finds.
    pub fn open(&self, caller: Ugid, path: &Path, flags: i32) -> Result<OpenReply> {
        self.path_call(Op::Open.name(), caller, path, |config, rel| {
            let branch = config.select_first(Op::Open, self.native(), rel)?;
            let file = self.native().open(&branch.join(rel), flags)?;
            Ok(self.register(file, branch.root(), flags))
        })
    }

    fn register(&self, file: Box<dyn NativeFile>, branch: &Path, flags: i32) -> OpenReply {
        let direct_io = wants_direct_io(flags);
        let fh = self.handles().insert(FileInfo::new(file, branch, direct_io));
        debug!(fh, branch = %branch.display(), direct_io, "handle opened");
        OpenReply { fh, direct_io }
    }
}
