//! The built-in selection algorithms.
//!
//! Naming follows the usual union-filesystem vocabulary:
//!
//! | name     | meaning                              |
//! |----------|--------------------------------------|
//! | `ff`     | first found                          |
//! | `all`    | every eligible branch                |
//! | `ep*`    | existing path: parent must exist     |
//! | `mfs`    | most free space                      |
//! | `lfs`    | least free space                     |
//! | `newest` | newest mtime of the path             |

use std::path::Path;

use braid_types::Branch;

use super::filter::{best_by, creatable, exists, mtime, space, writable, Rejections};
use super::PolicyResult;
use crate::native::NativeFs;

fn finish<'a>(selected: Vec<&'a Branch>, rej: Rejections) -> PolicyResult<'a> {
    if selected.is_empty() {
        Err(rej.into_error())
    } else {
        Ok(selected)
    }
}

fn one<'a>(selected: Option<&'a Branch>, rej: Rejections) -> PolicyResult<'a> {
    finish(selected.into_iter().collect(), rej)
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

pub(crate) fn ff_search<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches.iter().find(|b| exists(native, b, path, &mut rej));
    one(found, rej)
}

pub(crate) fn epall_search<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches
        .iter()
        .filter(|b| exists(native, b, path, &mut rej))
        .collect();
    finish(found, rej)
}

fn existing_with_space<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    rej: &mut Rejections,
) -> Vec<(&'a Branch, u64)> {
    branches
        .iter()
        .filter_map(|b| {
            if !exists(native, b, path, rej) {
                return None;
            }
            space(native, b, rej).map(|s| (b, s.available()))
        })
        .collect()
}

pub(crate) fn mfs_search<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = existing_with_space(native, branches, path, &mut rej);
    one(best_by(scored, |a, b| a > b), rej)
}

pub(crate) fn lfs_search<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = existing_with_space(native, branches, path, &mut rej);
    one(best_by(scored, |a, b| a < b), rej)
}

pub(crate) fn newest_search<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored: Vec<_> = branches
        .iter()
        .filter_map(|b| mtime(native, b, path, &mut rej).map(|t| (b, t)))
        .collect();
    one(best_by(scored, |a, b| a > b), rej)
}

// ---------------------------------------------------------------------------
// create (path is the parent directory of the new entry)
// ---------------------------------------------------------------------------

pub(crate) fn ff_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    _path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches
        .iter()
        .find(|b| creatable(native, b, min_free_space, &mut rej).is_some());
    one(found, rej)
}

pub(crate) fn all_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    _path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches
        .iter()
        .filter(|b| creatable(native, b, min_free_space, &mut rej).is_some())
        .collect();
    finish(found, rej)
}

pub(crate) fn epff_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches.iter().find(|b| {
        exists(native, b, path, &mut rej) && creatable(native, b, min_free_space, &mut rej).is_some()
    });
    one(found, rej)
}

pub(crate) fn epall_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches
        .iter()
        .filter(|b| {
            exists(native, b, path, &mut rej)
                && creatable(native, b, min_free_space, &mut rej).is_some()
        })
        .collect();
    finish(found, rej)
}

fn creatable_with_space<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    existing_path: Option<&Path>,
    min_free_space: u64,
    rej: &mut Rejections,
) -> Vec<(&'a Branch, u64)> {
    branches
        .iter()
        .filter_map(|b| {
            if let Some(p) = existing_path {
                if !exists(native, b, p, rej) {
                    return None;
                }
            }
            creatable(native, b, min_free_space, rej).map(|s| (b, s.available()))
        })
        .collect()
}

pub(crate) fn mfs_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    _path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = creatable_with_space(native, branches, None, min_free_space, &mut rej);
    one(best_by(scored, |a, b| a > b), rej)
}

pub(crate) fn epmfs_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = creatable_with_space(native, branches, Some(path), min_free_space, &mut rej);
    one(best_by(scored, |a, b| a > b), rej)
}

pub(crate) fn lfs_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    _path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = creatable_with_space(native, branches, None, min_free_space, &mut rej);
    one(best_by(scored, |a, b| a < b), rej)
}

pub(crate) fn newest_create<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored: Vec<_> = branches
        .iter()
        .filter_map(|b| {
            let t = mtime(native, b, path, &mut rej)?;
            creatable(native, b, min_free_space, &mut rej).map(|_| (b, t))
        })
        .collect();
    one(best_by(scored, |a, b| a > b), rej)
}

// ---------------------------------------------------------------------------
// action
// ---------------------------------------------------------------------------

pub(crate) fn ff_action<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches
        .iter()
        .find(|b| exists(native, b, path, &mut rej) && writable(native, b, &mut rej).is_some());
    one(found, rej)
}

pub(crate) fn all_action<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let found = branches
        .iter()
        .filter(|b| exists(native, b, path, &mut rej) && writable(native, b, &mut rej).is_some())
        .collect();
    finish(found, rej)
}

fn writable_existing_with_space<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    rej: &mut Rejections,
) -> Vec<(&'a Branch, u64)> {
    branches
        .iter()
        .filter_map(|b| {
            if !exists(native, b, path, rej) {
                return None;
            }
            writable(native, b, rej).map(|s| (b, s.available()))
        })
        .collect()
}

pub(crate) fn mfs_action<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = writable_existing_with_space(native, branches, path, &mut rej);
    one(best_by(scored, |a, b| a > b), rej)
}

pub(crate) fn lfs_action<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored = writable_existing_with_space(native, branches, path, &mut rej);
    one(best_by(scored, |a, b| a < b), rej)
}

pub(crate) fn newest_action<'a>(
    native: &dyn NativeFs,
    branches: &'a [Branch],
    path: &Path,
    _min_free_space: u64,
) -> PolicyResult<'a> {
    let mut rej = Rejections::default();
    let scored: Vec<_> = branches
        .iter()
        .filter_map(|b| {
            let t = mtime(native, b, path, &mut rej)?;
            writable(native, b, &mut rej).map(|_| (b, t))
        })
        .collect();
    one(best_by(scored, |a, b| a > b), rej)
}
