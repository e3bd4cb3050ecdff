//! The action executor: run one operation on every candidate branch.

use std::io;
use std::path::{Path, PathBuf};

use braid_types::Branch;
use nix::errno::Errno;
use tracing::{debug, warn};

use crate::error::errno_of;

/// What happened on one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(Errno),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl<T> From<io::Result<T>> for Outcome {
    fn from(result: io::Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failure(errno_of(&e)),
        }
    }
}

/// Apply `op` to `rel` on every candidate, in the order given.
///
/// There is no short-circuit: a failure on one branch never stops the
/// remaining branches from being tried, so copies of a file on different
/// branches don't drift apart. `op` receives the branch and the full path
/// of `rel` on it.
pub fn apply_to_all<'a, F>(candidates: &[&'a Branch], rel: &Path, mut op: F) -> Vec<Outcome>
where
    F: FnMut(&'a Branch, &Path) -> io::Result<()>,
{
    candidates
        .iter()
        .map(|&branch| {
            let full: PathBuf = branch.join(rel);
            let outcome = Outcome::from(op(branch, &full));
            match outcome {
                Outcome::Success => debug!(path = %full.display(), "branch op ok"),
                Outcome::Failure(errno) => {
                    warn!(path = %full.display(), %errno, "branch op failed")
                }
            }
            outcome
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::BranchMode;

    fn branches(roots: &[&str]) -> Vec<Branch> {
        roots
            .iter()
            .map(|r| Branch::new(*r, BranchMode::ReadWrite))
            .collect()
    }

    #[test]
    fn every_candidate_is_tried_in_order() {
        let owned = branches(&["/a", "/b", "/c"]);
        let candidates: Vec<&Branch> = owned.iter().collect();
        let mut seen = Vec::new();

        let outcomes = apply_to_all(&candidates, Path::new("x/y"), |_, full| {
            seen.push(full.to_path_buf());
            Err(io::Error::from_raw_os_error(Errno::EACCES as i32))
        });

        assert_eq!(
            seen,
            vec![
                PathBuf::from("/a/x/y"),
                PathBuf::from("/b/x/y"),
                PathBuf::from("/c/x/y"),
            ]
        );
        assert_eq!(outcomes, vec![Outcome::Failure(Errno::EACCES); 3]);
    }

    #[test]
    fn failures_do_not_stop_later_branches() {
        let owned = branches(&["/a", "/b", "/c"]);
        let candidates: Vec<&Branch> = owned.iter().collect();
        let mut calls = 0;

        let outcomes = apply_to_all(&candidates, Path::new("f"), |branch, _| {
            calls += 1;
            if branch.root() == Path::new("/a") {
                Err(io::Error::from_raw_os_error(Errno::EROFS as i32))
            } else {
                Ok(())
            }
        });

        assert_eq!(calls, 3);
        assert_eq!(
            outcomes,
            vec![Outcome::Failure(Errno::EROFS), Outcome::Success, Outcome::Success]
        );
    }

    #[test]
    fn no_candidates_no_calls() {
        let mut calls = 0;
        let outcomes = apply_to_all(&[], Path::new("f"), |_, _| {
            calls += 1;
            Ok(())
        });
        assert!(outcomes.is_empty());
        assert_eq!(calls, 0);
    }
}
