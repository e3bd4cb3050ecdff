//! Parent-directory cloning between branches.
//!
//! Before a create or rename lands on a branch, the directory it goes into
//! must exist there. Missing components are copied from a branch that has
//! them: same mode, same owner when the service may set it, same times.

use std::io;
use std::path::{Path, PathBuf};

use braid_types::Branch;
use nix::errno::Errno;
use tracing::debug;

use crate::error::errno_of;
use crate::native::{NativeFs, SetTime};

/// Make sure the directory `dir` (union-relative) exists on `to`, creating
/// whatever is missing after the layout on `from`.
pub(crate) fn clone_path(native: &dyn NativeFs, from: &Branch, to: &Branch, dir: &Path) -> io::Result<()> {
    if from.root() == to.root() {
        return Ok(());
    }

    let mut rel = PathBuf::new();
    for component in dir.components() {
        rel.push(component);
        let target = to.join(&rel);
        if native.exists(&target) {
            continue;
        }

        let source = native.lstat(&from.join(&rel))?;
        if !source.is_dir() {
            return Err(Errno::ENOTDIR.into());
        }

        match native.mkdir(&target, source.mode) {
            Ok(()) => {}
            // lost a race with another creator; theirs will do
            Err(e) if errno_of(&e) == Errno::EEXIST => continue,
            Err(e) => return Err(e),
        }
        debug!(
            from = %from.root().display(),
            to = %target.display(),
            mode = format_args!("{:o}", source.mode),
            "cloned directory"
        );

        match native.lchown(&target, Some(source.uid), Some(source.gid)) {
            Ok(()) => {}
            Err(e) if errno_of(&e) == Errno::EPERM => {}
            Err(e) => return Err(e),
        }
        native.utimens(&target, SetTime::At(source.atime), SetTime::At(source.mtime))?;
    }
    Ok(())
}
