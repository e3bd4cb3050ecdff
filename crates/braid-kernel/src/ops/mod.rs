//! Filesystem operations on a [`Union`](crate::Union).
//!
//! Each file adds one group of calls to `Union`. Path calls take the caller's
//! identity and a union path (leading `/` optional); handle calls take the
//! token returned by `create` or `open`.

mod attr;
mod handle;
mod link;
mod lookup;
mod mkdir;
mod open;
mod remove;
mod rename;
mod statfs;

use nix::fcntl::OFlag;

/// Result of a successful `open` or `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenReply {
    /// Token for later handle calls.
    pub fh: u64,
    /// The transport should bypass its page cache for this handle.
    pub direct_io: bool,
}

fn wants_direct_io(flags: i32) -> bool {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        flags & OFlag::O_DIRECT.bits() != 0
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        let _ = flags;
        false
    }
}
