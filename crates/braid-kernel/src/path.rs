//! Union-relative path handling.

use std::path::{Component, Path, PathBuf};

use nix::errno::Errno;

use crate::error::{BraidError, Result};

/// Normalize a union path to a relative one: strip the leading `/`, drop
/// `.` components, resolve `..` lexically.
///
/// A `..` that would climb above the union root is `EACCES`. Branch roots
/// are joined with the result, so escaping here would escape the branch.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(BraidError::Branch(Errno::EACCES));
                }
            }
            Component::Normal(c) => normalized.push(c),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    Ok(normalized)
}

/// Parent of a relative path; the union root's parent is the root itself.
pub fn parent(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::absolute("/a/b", "a/b")]
    #[case::relative("a/b", "a/b")]
    #[case::dots("/a/./b/../c", "a/c")]
    #[case::root("/", "")]
    #[case::empty("", "")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(Path::new(input)).unwrap(), PathBuf::from(expected));
    }

    #[rstest]
    #[case::leading("../etc/passwd")]
    #[case::nested("/a/../../etc")]
    fn rejects_escape(#[case] input: &str) {
        assert_eq!(
            normalize(Path::new(input)).unwrap_err(),
            BraidError::Branch(Errno::EACCES)
        );
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(parent(Path::new("file")), Path::new(""));
        assert_eq!(parent(Path::new("a/b")), Path::new("a"));
        assert_eq!(parent(Path::new("")), Path::new(""));
    }
}
