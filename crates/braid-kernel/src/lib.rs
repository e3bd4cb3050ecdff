//! braid-kernel (核): the operational core of a union filesystem.
//!
//! A union presents several directory trees ("branches") as one. For every
//! filesystem call the kernel decides which branches the call applies to,
//! runs it against each of them, and folds the per-branch outcomes into the
//! single errno the caller expects.
//!
//! # Architecture
//!
//! ```text
//! path call ──► IdentityContext ──► ConfigHolder (shared) ──► Policy
//!                                                              │
//!                        errno ◄── reduce ◄── apply_to_all ◄───┘
//!
//! handle call ──► HandleTable ──► FileInfo ──► NativeFile (bound branch)
//! ```
//!
//! - **Config / ConfigHolder**: the branch list and policies, swapped
//!   wholesale under an exclusive lock, read under a shared one.
//! - **Policy**: picks candidate branches for a path (search, create, action).
//! - **apply_to_all / reduce**: replicate an operation and fold the outcomes.
//!   Any success wins; otherwise the last failure's errno is returned.
//! - **IdentityContext**: switches effective uid/gid for the call's duration.
//! - **HandleTable**: open files bound to the branch they were opened on.
//! - **NativeFs**: the filesystem primitives everything above consumes.

pub mod aggregate;
mod clone;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod identity;
pub mod native;
mod ops;
pub mod path;
pub mod policy;
mod union;

pub use aggregate::{reduce, Accumulator};
pub use braid_types::{Branch, BranchMode, Ugid};
pub use config::{Config, ConfigHolder, ConfigReadGuard, DEFAULT_MIN_FREE_SPACE};
pub use error::{BraidError, Result};
pub use executor::{apply_to_all, Outcome};
pub use handle::{FileInfo, HandleTable};
pub use identity::{Credentials, IdentityContext, ProcessCredentials, UgidGuard};
pub use native::{Attr, EntryKind, LocalFs, NativeFile, NativeFs, SetTime, SpaceInfo};
pub use ops::OpenReply;
pub use policy::{Category, Op, Policy, PolicyFamily, PolicyRegistry};
pub use union::Union;

/// Re-exported so callers can name errno values, open flags and access
/// modes without a direct nix dependency.
pub use nix::errno::Errno;
pub use nix::fcntl::OFlag;
pub use nix::unistd::AccessFlags;
