//! Branch-selection policies.
//!
//! A policy picks, for one path, the branches a call should touch. Every
//! policy name comes in three flavours, one per [`Category`]:
//!
//! - **search**: read-only lookups. Only branches where the path exists.
//! - **create**: making new entries. Skips read-only and no-create branches
//!   and branches short on space. Evaluated on the parent directory.
//! - **action**: changing existing entries. Skips read-only branches and
//!   branches that don't hold the path.
//!
//! A [`Policy`] is a plain value: a name, a category and a selection
//! function. The config holds one per category plus per-operation
//! overrides, and is rebuilt wholesale when any of them changes.

mod algorithms;
pub(crate) mod filter;
mod registry;

pub use registry::{PolicyFamily, PolicyRegistry};

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use braid_types::Branch;
use nix::errno::Errno;
use tracing::debug;

use crate::error::{BraidError, Result};
use crate::native::NativeFs;

/// Branches picked by a policy, in the order they should be tried.
pub type PolicyResult<'a> = Result<Vec<&'a Branch>>;

/// Signature of a selection algorithm: `(native, branches, path,
/// min_free_space)`. Must not depend on anything but its arguments and the
/// filesystem state it probes.
pub type SelectFn = for<'a> fn(&dyn NativeFs, &'a [Branch], &Path, u64) -> PolicyResult<'a>;

/// Policy archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Search,
    Create,
    Action,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Search => "search",
            Category::Create => "create",
            Category::Action => "action",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path-based operations that consult a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Access,
    Chmod,
    Chown,
    Create,
    Getattr,
    Link,
    Mkdir,
    Open,
    Readlink,
    Rename,
    Rmdir,
    Symlink,
    Truncate,
    Unlink,
    Utimens,
}

impl Op {
    pub const ALL: [Op; 15] = [
        Op::Access,
        Op::Chmod,
        Op::Chown,
        Op::Create,
        Op::Getattr,
        Op::Link,
        Op::Mkdir,
        Op::Open,
        Op::Readlink,
        Op::Rename,
        Op::Rmdir,
        Op::Symlink,
        Op::Truncate,
        Op::Unlink,
        Op::Utimens,
    ];

    pub fn category(self) -> Category {
        match self {
            Op::Access | Op::Getattr | Op::Open | Op::Readlink => Category::Search,
            Op::Create | Op::Mkdir | Op::Symlink => Category::Create,
            Op::Chmod
            | Op::Chown
            | Op::Link
            | Op::Rename
            | Op::Rmdir
            | Op::Truncate
            | Op::Unlink
            | Op::Utimens => Category::Action,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Access => "access",
            Op::Chmod => "chmod",
            Op::Chown => "chown",
            Op::Create => "create",
            Op::Getattr => "getattr",
            Op::Link => "link",
            Op::Mkdir => "mkdir",
            Op::Open => "open",
            Op::Readlink => "readlink",
            Op::Rename => "rename",
            Op::Rmdir => "rmdir",
            Op::Symlink => "symlink",
            Op::Truncate => "truncate",
            Op::Unlink => "unlink",
            Op::Utimens => "utimens",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Op {
    type Err = BraidError;

    fn from_str(s: &str) -> Result<Self> {
        Op::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| BraidError::Config(format!("unknown operation '{s}'")))
    }
}

/// A selection algorithm bound to a category.
#[derive(Clone, Copy)]
pub struct Policy {
    name: &'static str,
    category: Category,
    select: SelectFn,
}

/// `ff`: first branch holding the path.
pub const DEFAULT_SEARCH: Policy = Policy::new("ff", Category::Search, algorithms::ff_search);

/// `epmfs`: most free space among branches that already hold the parent.
pub const DEFAULT_CREATE: Policy =
    Policy::new("epmfs", Category::Create, algorithms::epmfs_create);

/// `epall`: every writable branch holding the path.
pub const DEFAULT_ACTION: Policy = Policy::new("epall", Category::Action, algorithms::all_action);

impl Policy {
    pub const fn new(name: &'static str, category: Category, select: SelectFn) -> Self {
        Self {
            name,
            category,
            select,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// The built-in default for `category`.
    pub fn default_for(category: Category) -> Policy {
        match category {
            Category::Search => DEFAULT_SEARCH,
            Category::Create => DEFAULT_CREATE,
            Category::Action => DEFAULT_ACTION,
        }
    }

    /// Run the algorithm.
    ///
    /// An algorithm that comes back empty without an error is treated as
    /// `NoBranchAvailable`, so callers never replicate over nothing.
    pub fn select<'a>(
        &self,
        native: &dyn NativeFs,
        branches: &'a [Branch],
        path: &Path,
        min_free_space: u64,
    ) -> PolicyResult<'a> {
        let selected = (self.select)(native, branches, path, min_free_space)?;
        if selected.is_empty() {
            return Err(BraidError::no_branch(Errno::ENOENT));
        }
        debug!(
            policy = self.name,
            category = %self.category,
            path = %path.display(),
            selected = selected.len(),
            "branches selected"
        );
        Ok(selected)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.category == other.category
    }
}

impl Eq for Policy {}
