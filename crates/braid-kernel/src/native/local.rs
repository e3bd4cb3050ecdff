//! Local filesystem backend.
//!
//! Thin wrappers over `std::fs` and `nix` for the primitives a branch
//! needs. No path resolution happens here: callers pass the branch root
//! already joined with the union path.

use std::fs::{self, DirBuilder, File, FileTimes, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::fcntl::OFlag;
use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::statvfs::{statvfs, FsFlags};
use nix::sys::time::TimeSpec;
use nix::unistd::{self, AccessFlags};

use super::{Attr, EntryKind, NativeFile, NativeFs, SetTime, SpaceInfo};

/// Real filesystem access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    /// Read/write options for the access mode encoded in `flags`.
    fn options(flags: i32) -> OpenOptions {
        let mut opts = OpenOptions::new();
        let accmode = flags & OFlag::O_ACCMODE.bits();
        if accmode == OFlag::O_WRONLY.bits() {
            opts.write(true);
        } else if accmode == OFlag::O_RDWR.bits() {
            opts.read(true).write(true);
        } else {
            opts.read(true);
        }
        opts
    }
}

fn attr_from(meta: &fs::Metadata) -> Attr {
    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };

    Attr {
        kind,
        mode: meta.mode() & 0o7777,
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.size(),
        nlink: meta.nlink(),
        ino: meta.ino(),
        dev: meta.dev(),
        atime: meta.accessed().unwrap_or(UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(UNIX_EPOCH),
        ctime: epoch_offset(meta.ctime(), meta.ctime_nsec()),
    }
}

fn epoch_offset(secs: i64, nsecs: i64) -> SystemTime {
    match (u64::try_from(secs), u32::try_from(nsecs)) {
        (Ok(secs), Ok(nsecs)) => UNIX_EPOCH + Duration::new(secs, nsecs),
        _ => UNIX_EPOCH,
    }
}

fn timespec(time: SetTime) -> TimeSpec {
    match time {
        SetTime::Omit => TimeSpec::UTIME_OMIT,
        SetTime::Now => TimeSpec::UTIME_NOW,
        SetTime::At(t) => TimeSpec::from(t.duration_since(UNIX_EPOCH).unwrap_or_default()),
    }
}

impl NativeFs for LocalFs {
    fn lstat(&self, path: &Path) -> io::Result<Attr> {
        fs::symlink_metadata(path).map(|meta| attr_from(&meta))
    }

    fn statvfs(&self, path: &Path) -> io::Result<SpaceInfo> {
        let st = statvfs(path)?;
        Ok(SpaceInfo {
            block_size: st.fragment_size() as u64,
            blocks: st.blocks() as u64,
            blocks_free: st.blocks_free() as u64,
            blocks_available: st.blocks_available() as u64,
            files: st.files() as u64,
            files_free: st.files_free() as u64,
            name_max: st.name_max() as u64,
            fsid: st.filesystem_id() as u64,
            read_only: st.flags().contains(FsFlags::ST_RDONLY),
        })
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, Permissions::from_mode(mode))
    }

    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        std::os::unix::fs::lchown(path, uid, gid)
    }

    fn utimens(&self, path: &Path, atime: SetTime, mtime: SetTime) -> io::Result<()> {
        utimensat(
            None,
            path,
            &timespec(atime),
            &timespec(mtime),
            UtimensatFlags::NoFollowSymlink,
        )?;
        Ok(())
    }

    fn truncate(&self, path: &Path, size: u64) -> io::Result<()> {
        let len = i64::try_from(size).map_err(|_| io::Error::from(nix::errno::Errno::EFBIG))?;
        unistd::truncate(path, len)?;
        Ok(())
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        DirBuilder::new().mode(mode).create(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::hard_link(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn access(&self, path: &Path, mode: AccessFlags) -> io::Result<()> {
        unistd::access(path, mode)?;
        Ok(())
    }

    fn open(&self, path: &Path, flags: i32) -> io::Result<Box<dyn NativeFile>> {
        let file = Self::options(flags).custom_flags(flags).open(path)?;
        Ok(Box::new(LocalFile::new(file)))
    }

    fn create(&self, path: &Path, flags: i32, mode: u32) -> io::Result<Box<dyn NativeFile>> {
        // O_CREAT rides in custom_flags: std refuses `.create(true)` on
        // read-only opens, open(2) does not.
        let file = Self::options(flags)
            .custom_flags(flags | OFlag::O_CREAT.bits())
            .mode(mode)
            .open(path)?;
        Ok(Box::new(LocalFile::new(file)))
    }
}

/// An open file on a local branch.
#[derive(Debug)]
pub struct LocalFile {
    file: File,
}

impl LocalFile {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl NativeFile for LocalFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<usize> {
        self.file.write_at(data, offset)
    }

    fn set_mode(&self, mode: u32) -> io::Result<()> {
        self.file.set_permissions(Permissions::from_mode(mode))
    }

    fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        std::os::unix::fs::fchown(&self.file, uid, gid)
    }

    fn set_len(&self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    fn set_times(&self, atime: SetTime, mtime: SetTime) -> io::Result<()> {
        let resolve = |t: SetTime| match t {
            SetTime::Omit => None,
            SetTime::Now => Some(SystemTime::now()),
            SetTime::At(t) => Some(t),
        };
        let mut times = FileTimes::new();
        if let Some(t) = resolve(atime) {
            times = times.set_accessed(t);
        }
        if let Some(t) = resolve(mtime) {
            times = times.set_modified(t);
        }
        self.file.set_times(times)
    }

    fn attr(&self) -> io::Result<Attr> {
        self.file.metadata().map(|meta| attr_from(&meta))
    }

    fn sync(&self, data_only: bool) -> io::Result<()> {
        if data_only {
            self.file.sync_data()
        } else {
            self.file.sync_all()
        }
    }

    fn flush(&self) -> io::Result<()> {
        // dup + close, the same sequence close(2) on a client dup triggers.
        drop(self.file.try_clone()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalFs, TempDir) {
        (LocalFs::new(), TempDir::new().unwrap())
    }

    #[test]
    fn test_create_write_read() {
        let (fs, dir) = setup();
        let path = dir.path().join("file.txt");

        let file = fs.create(&path, OFlag::O_RDWR.bits(), 0o644).unwrap();
        assert_eq!(file.write_at(b"hello", 0).unwrap(), 5);

        let mut buf = [0u8; 5];
        assert_eq!(file.read_at(&mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let attr = fs.lstat(&path).unwrap();
        assert!(attr.is_file());
        assert_eq!(attr.size, 5);
    }

    #[test]
    fn test_create_read_only_open() {
        let (fs, dir) = setup();
        let path = dir.path().join("ro.txt");
        fs.create(&path, OFlag::O_RDONLY.bits(), 0o600).unwrap();
        assert!(fs.exists(&path));
    }

    #[test]
    fn test_open_missing_is_enoent() {
        let (fs, dir) = setup();
        let err = fs.open(&dir.path().join("nope"), OFlag::O_RDONLY.bits()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(nix::errno::Errno::ENOENT as i32));
    }

    #[test]
    fn test_chmod_and_lstat() {
        let (fs, dir) = setup();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        fs.chmod(&path, 0o600).unwrap();
        assert_eq!(fs.lstat(&path).unwrap().mode, 0o600);
    }

    #[test]
    fn test_mkdir_rmdir() {
        let (fs, dir) = setup();
        let path = dir.path().join("d");

        fs.mkdir(&path, 0o750).unwrap();
        let attr = fs.lstat(&path).unwrap();
        assert!(attr.is_dir());

        fs.rmdir(&path).unwrap();
        assert!(!fs.exists(&path));
    }

    #[test]
    fn test_truncate() {
        let (fs, dir) = setup();
        let path = dir.path().join("t");
        fs::write(&path, b"0123456789").unwrap();

        fs.truncate(&path, 4).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"0123");
    }

    #[test]
    fn test_symlink_readlink_lstat() {
        let (fs, dir) = setup();
        let link = dir.path().join("link");

        fs.symlink(Path::new("target.txt"), &link).unwrap();
        assert_eq!(fs.readlink(&link).unwrap(), PathBuf::from("target.txt"));
        // dangling, but lstat sees the link itself
        assert!(fs.lstat(&link).unwrap().is_symlink());
    }

    #[test]
    fn test_link_and_rename() {
        let (fs, dir) = setup();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"data").unwrap();

        fs.link(&a, &b).unwrap();
        assert_eq!(fs.lstat(&a).unwrap().nlink, 2);

        fs.rename(&b, &c).unwrap();
        assert!(!fs.exists(&b));
        assert_eq!(fs::read(&c).unwrap(), b"data");

        fs.unlink(&c).unwrap();
        assert_eq!(fs.lstat(&a).unwrap().nlink, 1);
    }

    #[test]
    fn test_utimens_sets_mtime() {
        let (fs, dir) = setup();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        let when = UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs.utimens(&path, SetTime::Omit, SetTime::At(when)).unwrap();
        assert_eq!(fs.lstat(&path).unwrap().mtime, when);
    }

    #[test]
    fn test_file_set_times_and_len() {
        let (fs, dir) = setup();
        let path = dir.path().join("f");
        let file = fs.create(&path, OFlag::O_WRONLY.bits(), 0o644).unwrap();

        file.write_at(b"abcdef", 0).unwrap();
        file.set_len(2).unwrap();
        let when = UNIX_EPOCH + Duration::from_secs(42);
        file.set_times(SetTime::At(when), SetTime::At(when)).unwrap();
        file.sync(false).unwrap();
        file.flush().unwrap();

        let attr = file.attr().unwrap();
        assert_eq!(attr.size, 2);
        assert_eq!(attr.mtime, when);
    }

    #[test]
    fn test_lchown_to_self_is_allowed() {
        let (fs, dir) = setup();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        let attr = fs.lstat(&path).unwrap();
        fs.lchown(&path, Some(attr.uid), Some(attr.gid)).unwrap();
        fs.lchown(&path, None, None).unwrap();
    }

    #[test]
    fn test_statvfs_reports_space() {
        let (fs, dir) = setup();
        let space = fs.statvfs(dir.path()).unwrap();
        assert!(space.block_size > 0);
        assert!(space.total() >= space.available());
    }

    #[test]
    fn test_access_existing() {
        let (fs, dir) = setup();
        fs.access(dir.path(), AccessFlags::F_OK).unwrap();
        assert!(fs.access(&dir.path().join("missing"), AccessFlags::F_OK).is_err());
    }
}
