//! Effective user and group identity.

use std::fmt;

/// A `(uid, gid)` pair: who a filesystem call runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ugid {
    pub uid: u32,
    pub gid: u32,
}

impl Ugid {
    pub const ROOT: Ugid = Ugid { uid: 0, gid: 0 };

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

impl fmt::Display for Ugid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}
