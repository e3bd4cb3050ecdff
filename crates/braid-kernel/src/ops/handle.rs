//! Handle calls: straight to the file the handle was opened on.
//!
//! None of these take the config lock or consult a policy, and none switch
//! identity: permission was checked when the file was opened. They do wait
//! for a process-wide switch to be undone first.

use tracing::debug;

use crate::error::Result;
use crate::native::{Attr, SetTime};
use crate::union::Union;

impl Union {
    pub fn read(&self, fh: u64, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.with_handle(fh, |info| info.file().read_at(buf, offset))
    }

    pub fn write(&self, fh: u64, data: &[u8], offset: u64) -> Result<usize> {
        self.with_handle(fh, |info| info.file().write_at(data, offset))
    }

    pub fn fchmod(&self, fh: u64, mode: u32) -> Result<()> {
        self.with_handle(fh, |info| info.file().set_mode(mode))
    }

    pub fn fchown(&self, fh: u64, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        self.with_handle(fh, |info| info.file().set_owner(uid, gid))
    }

    pub fn ftruncate(&self, fh: u64, size: u64) -> Result<()> {
        self.with_handle(fh, |info| info.file().set_len(size))
    }

    pub fn futimens(&self, fh: u64, atime: SetTime, mtime: SetTime) -> Result<()> {
        self.with_handle(fh, |info| info.file().set_times(atime, mtime))
    }

    pub fn fgetattr(&self, fh: u64) -> Result<Attr> {
        self.with_handle(fh, |info| info.file().attr())
    }

    /// `fsync`, or `fdatasync` when `data_only`.
    pub fn fsync(&self, fh: u64, data_only: bool) -> Result<()> {
        self.with_handle(fh, |info| info.file().sync(data_only))
    }

    pub fn flush(&self, fh: u64) -> Result<()> {
        self.with_handle(fh, |info| info.file().flush())
    }

    /// Drop the handle. The descriptor closes when the last in-flight call
    /// on it returns.
    pub fn release(&self, fh: u64) -> Result<()> {
        let info = self.handles().remove(fh)?;
        debug!(fh, branch = %info.branch().display(), "handle released");
        Ok(())
    }
}
