//! Native filesystem capability.
//!
//! The kernel never calls the OS directly. Everything it does to a branch
//! goes through [`NativeFs`] (path-based) or [`NativeFile`] (descriptor-based),
//! so tests can substitute a recording implementation and the policies can be
//! exercised without real disks.
//!
//! All paths handed to these traits are absolute: a branch root joined with
//! the union-relative path.

mod local;

pub use local::{LocalFile, LocalFs};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use nix::unistd::AccessFlags;

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, pipes, devices.
    Other,
}

/// Attributes of one entry on one branch, as `lstat` reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub kind: EntryKind,
    /// Permission bits only (`0o7777`).
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u64,
    pub ino: u64,
    pub dev: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Attr {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

/// Space figures for the filesystem a branch lives on (`statvfs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceInfo {
    /// Fragment size; the unit of the block counts below.
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    /// Blocks available to unprivileged users.
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u64,
    /// Identifies the underlying filesystem; branches sharing one are counted once.
    pub fsid: u64,
    /// Mounted read-only.
    pub read_only: bool,
}

impl SpaceInfo {
    /// Bytes available to unprivileged users.
    pub fn available(&self) -> u64 {
        self.blocks_available.saturating_mul(self.block_size)
    }

    pub fn total(&self) -> u64 {
        self.blocks.saturating_mul(self.block_size)
    }
}

/// A timestamp argument to `utimens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    /// Leave unchanged.
    Omit,
    /// The current time.
    Now,
    At(SystemTime),
}

/// Path-based filesystem primitives.
pub trait NativeFs: Send + Sync {
    /// Attributes without following a trailing symlink.
    fn lstat(&self, path: &Path) -> io::Result<Attr>;

    /// Space on the filesystem holding `path`.
    fn statvfs(&self, path: &Path) -> io::Result<SpaceInfo>;

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Change ownership without following a trailing symlink. `None` leaves
    /// that id unchanged.
    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;

    /// Set access and modification times without following symlinks.
    fn utimens(&self, path: &Path, atime: SetTime, mtime: SetTime) -> io::Result<()>;

    fn truncate(&self, path: &Path, size: u64) -> io::Result<()>;

    fn unlink(&self, path: &Path) -> io::Result<()>;

    fn rmdir(&self, path: &Path) -> io::Result<()>;

    /// Create one directory. Parents must exist.
    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Create a symlink at `link` whose content is `target`, stored verbatim.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn link(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;

    fn access(&self, path: &Path, mode: AccessFlags) -> io::Result<()>;

    /// Open an existing file. `flags` are `open(2)` flags.
    fn open(&self, path: &Path, flags: i32) -> io::Result<Box<dyn NativeFile>>;

    /// Create and open a file with the given permission bits.
    fn create(&self, path: &Path, flags: i32, mode: u32) -> io::Result<Box<dyn NativeFile>>;

    /// True if something (of any kind) exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        self.lstat(path).is_ok()
    }
}

/// Descriptor-based primitives on one open file.
pub trait NativeFile: Send + Sync + fmt::Debug {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<usize>;

    fn set_mode(&self, mode: u32) -> io::Result<()>;

    fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;

    fn set_len(&self, size: u64) -> io::Result<()>;

    fn set_times(&self, atime: SetTime, mtime: SetTime) -> io::Result<()>;

    fn attr(&self) -> io::Result<Attr>;

    /// `fsync`, or `fdatasync` when `data_only`.
    fn sync(&self, data_only: bool) -> io::Result<()>;

    /// Called on every `close()` of a duplicate of the handle. Lets network
    /// filesystems under a branch push out buffered state.
    fn flush(&self) -> io::Result<()>;
}
