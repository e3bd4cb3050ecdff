//! Branch eligibility checks shared by the algorithms.

use std::path::Path;
use std::time::SystemTime;

use braid_types::Branch;
use nix::errno::Errno;

use crate::error::{errno_of, BraidError};
use crate::native::{NativeFs, SpaceInfo};

/// Why branches were turned down, reduced to the errno worth reporting.
///
/// `EROFS` outranks `ENOSPC` outranks `ENOENT`: a path that exists only on
/// a read-only branch is a read-only problem, not a missing file.
#[derive(Debug, Default)]
pub(crate) struct Rejections(Option<Errno>);

fn rank(errno: Errno) -> u8 {
    match errno {
        Errno::EROFS => 3,
        Errno::ENOSPC => 2,
        Errno::ENOENT => 1,
        _ => 0,
    }
}

impl Rejections {
    pub(crate) fn note(&mut self, errno: Errno) {
        match self.0 {
            Some(current) if rank(current) >= rank(errno) => {}
            _ => self.0 = Some(errno),
        }
    }

    pub(crate) fn into_error(self) -> BraidError {
        BraidError::no_branch(self.0.unwrap_or(Errno::ENOENT))
    }
}

/// `path` exists on `branch`.
pub(crate) fn exists(native: &dyn NativeFs, branch: &Branch, path: &Path, rej: &mut Rejections) -> bool {
    let present = native.exists(&branch.join(path));
    if !present {
        rej.note(Errno::ENOENT);
    }
    present
}

/// Modification time of `path` on `branch`, if it exists there.
pub(crate) fn mtime(
    native: &dyn NativeFs,
    branch: &Branch,
    path: &Path,
    rej: &mut Rejections,
) -> Option<SystemTime> {
    match native.lstat(&branch.join(path)) {
        Ok(attr) => Some(attr.mtime),
        Err(_) => {
            rej.note(Errno::ENOENT);
            None
        }
    }
}

pub(crate) fn space(native: &dyn NativeFs, branch: &Branch, rej: &mut Rejections) -> Option<SpaceInfo> {
    match native.statvfs(branch.root()) {
        Ok(space) => Some(space),
        Err(e) => {
            rej.note(errno_of(&e));
            None
        }
    }
}

/// Branch accepts modifications: not RO and not mounted read-only.
pub(crate) fn writable(native: &dyn NativeFs, branch: &Branch, rej: &mut Rejections) -> Option<SpaceInfo> {
    if !branch.mode().allows_write() {
        rej.note(Errno::EROFS);
        return None;
    }
    let space = space(native, branch, rej)?;
    if space.read_only {
        rej.note(Errno::EROFS);
        return None;
    }
    Some(space)
}

/// Branch accepts new entries: RW, mounted read-write, and at least the
/// free-space threshold available.
pub(crate) fn creatable(
    native: &dyn NativeFs,
    branch: &Branch,
    min_free_space: u64,
    rej: &mut Rejections,
) -> Option<SpaceInfo> {
    if !branch.mode().allows_create() {
        rej.note(Errno::EROFS);
        return None;
    }
    let space = space(native, branch, rej)?;
    if space.read_only {
        rej.note(Errno::EROFS);
        return None;
    }
    if space.available() < branch.effective_min_free_space(min_free_space) {
        rej.note(Errno::ENOSPC);
        return None;
    }
    Some(space)
}

/// First candidate whose key is strictly better than every earlier one.
/// Ties keep configured branch order.
pub(crate) fn best_by<'a, K>(
    scored: impl IntoIterator<Item = (&'a Branch, K)>,
    better: impl Fn(&K, &K) -> bool,
) -> Option<&'a Branch> {
    let mut best: Option<(&'a Branch, K)> = None;
    for (branch, key) in scored {
        match &best {
            Some((_, best_key)) if !better(&key, best_key) => {}
            _ => best = Some((branch, key)),
        }
    }
    best.map(|(branch, _)| branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::BranchMode;

    #[test]
    fn rejection_precedence() {
        let mut rej = Rejections::default();
        rej.note(Errno::ENOENT);
        rej.note(Errno::ENOSPC);
        rej.note(Errno::ENOENT);
        assert_eq!(rej.into_error(), BraidError::no_branch(Errno::ENOSPC));

        let mut rej = Rejections::default();
        rej.note(Errno::EROFS);
        rej.note(Errno::ENOSPC);
        assert_eq!(rej.into_error(), BraidError::no_branch(Errno::EROFS));
    }

    #[test]
    fn nothing_noted_is_enoent() {
        assert_eq!(
            Rejections::default().into_error(),
            BraidError::no_branch(Errno::ENOENT)
        );
    }

    #[test]
    fn best_by_keeps_first_of_equals() {
        let branches = [
            Branch::new("/a", BranchMode::ReadWrite),
            Branch::new("/b", BranchMode::ReadWrite),
            Branch::new("/c", BranchMode::ReadWrite),
        ];
        let scored = branches.iter().zip([5u64, 9, 9]);
        let best = best_by(scored, |a, b| a > b).unwrap();
        assert_eq!(best.root(), Path::new("/b"));

        let scored = branches.iter().zip([5u64, 5, 5]);
        let least = best_by(scored, |a, b| a < b).unwrap();
        assert_eq!(least.root(), Path::new("/a"));
    }
}
