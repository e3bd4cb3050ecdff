//! Kernel error type and its errno mapping.
//!
//! Every error a filesystem call can end with maps to exactly one errno,
//! which the transport returns negated.

use std::io;

use braid_types::{ParseError, Ugid};
use nix::errno::Errno;

pub type Result<T, E = BraidError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BraidError {
    /// No branch passed the policy's filters. Raised before any branch is touched.
    #[error("no branch available: {errno}")]
    NoBranchAvailable { errno: Errno },

    /// The folded result of a branch operation that failed everywhere it ran.
    #[error("branch operation failed: {0}")]
    Branch(Errno),

    /// The caller's effective identity could not be assumed.
    #[error("cannot assume identity {target}: {errno}")]
    Identity { target: Ugid, errno: Errno },

    /// Handle token not present in the handle table.
    #[error("bad file handle {0}")]
    BadHandle(u64),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BraidError {
    pub fn no_branch(errno: Errno) -> Self {
        BraidError::NoBranchAvailable { errno }
    }

    /// The errno this error reports to the filesystem client.
    pub fn errno(&self) -> Errno {
        match self {
            BraidError::NoBranchAvailable { errno } => *errno,
            BraidError::Branch(errno) => *errno,
            BraidError::Identity { .. } => Errno::EPERM,
            BraidError::BadHandle(_) => Errno::EBADF,
            BraidError::Config(_) => Errno::EINVAL,
        }
    }

    /// Negative errno, as the transport hands it back to the kernel.
    pub fn status(&self) -> i32 {
        -(self.errno() as i32)
    }
}

/// `0` for success, the negative errno otherwise.
pub fn to_status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.status(),
    }
}

/// Errno carried by an I/O error. Errors without an OS code become `EIO`.
pub fn errno_of(err: &io::Error) -> Errno {
    err.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
}

impl From<io::Error> for BraidError {
    fn from(err: io::Error) -> Self {
        BraidError::Branch(errno_of(&err))
    }
}

impl From<Errno> for BraidError {
    fn from(errno: Errno) -> Self {
        BraidError::Branch(errno)
    }
}

impl From<ParseError> for BraidError {
    fn from(err: ParseError) -> Self {
        BraidError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_negative_errno() {
        assert_eq!(BraidError::Branch(Errno::ENOSPC).status(), -(Errno::ENOSPC as i32));
        assert_eq!(to_status::<()>(&Ok(())), 0);
        assert_eq!(
            to_status::<()>(&Err(BraidError::no_branch(Errno::ENOENT))),
            -(Errno::ENOENT as i32)
        );
    }

    #[test]
    fn identity_failures_are_permission_errors() {
        let err = BraidError::Identity {
            target: Ugid::new(1000, 1000),
            errno: Errno::EINVAL,
        };
        assert_eq!(err.errno(), Errno::EPERM);
    }

    #[test]
    fn io_errors_keep_their_code() {
        let err = io::Error::from_raw_os_error(Errno::EACCES as i32);
        assert_eq!(BraidError::from(err), BraidError::Branch(Errno::EACCES));

        let synthetic = io::Error::new(io::ErrorKind::Other, "no os code");
        assert_eq!(errno_of(&synthetic), Errno::EIO);
    }
}
