//! Open file handles.
//!
//! A [`FileInfo`] binds an open native file to the branch it was opened on.
//! Handle-based calls go straight to that file: no policy, no config lock.
//! The table hands out `u64` tokens the transport passes back on later calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{BraidError, Result};
use crate::native::NativeFile;

/// An open file and the branch it lives on.
#[derive(Debug)]
pub struct FileInfo {
    file: Box<dyn NativeFile>,
    branch: PathBuf,
    direct_io: bool,
}

impl FileInfo {
    pub fn new(file: Box<dyn NativeFile>, branch: impl Into<PathBuf>, direct_io: bool) -> Self {
        Self {
            file,
            branch: branch.into(),
            direct_io,
        }
    }

    pub fn file(&self) -> &dyn NativeFile {
        self.file.as_ref()
    }

    /// Root of the branch the file was opened on.
    pub fn branch(&self) -> &Path {
        &self.branch
    }

    pub fn direct_io(&self) -> bool {
        self.direct_io
    }
}

/// Token → open file.
///
/// The mutex guards only the map; lookups clone the `Arc` out so no I/O
/// runs under it. Dropping the last `Arc` closes the descriptor.
#[derive(Debug)]
pub struct HandleTable {
    next_fh: AtomicU64,
    handles: Mutex<HashMap<u64, Arc<FileInfo>>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<FileInfo>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an open file, returning its token.
    pub fn insert(&self, info: FileInfo) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.map().insert(fh, Arc::new(info));
        fh
    }

    pub fn get(&self, fh: u64) -> Result<Arc<FileInfo>> {
        self.map().get(&fh).cloned().ok_or(BraidError::BadHandle(fh))
    }

    /// Forget a token. The file closes once in-flight users let go of it.
    pub fn remove(&self, fh: u64) -> Result<Arc<FileInfo>> {
        self.map().remove(&fh).ok_or(BraidError::BadHandle(fh))
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{Attr, SetTime};
    use std::io;

    #[derive(Debug)]
    struct NullFile;

    impl NativeFile for NullFile {
        fn read_at(&self, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
            Ok(0)
        }
        fn write_at(&self, data: &[u8], _offset: u64) -> io::Result<usize> {
            Ok(data.len())
        }
        fn set_mode(&self, _mode: u32) -> io::Result<()> {
            Ok(())
        }
        fn set_owner(&self, _uid: Option<u32>, _gid: Option<u32>) -> io::Result<()> {
            Ok(())
        }
        fn set_len(&self, _size: u64) -> io::Result<()> {
            Ok(())
        }
        fn set_times(&self, _atime: SetTime, _mtime: SetTime) -> io::Result<()> {
            Ok(())
        }
        fn attr(&self) -> io::Result<Attr> {
            Err(io::Error::from_raw_os_error(nix::errno::Errno::ENOSYS as i32))
        }
        fn sync(&self, _data_only: bool) -> io::Result<()> {
            Ok(())
        }
        fn flush(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn insert_get_remove() {
        let table = HandleTable::new();
        let fh = table.insert(FileInfo::new(Box::new(NullFile), "/mnt/a", false));

        let info = table.get(fh).unwrap();
        assert_eq!(info.branch(), Path::new("/mnt/a"));
        assert!(!info.direct_io());
        assert_eq!(table.len(), 1);

        table.remove(fh).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.get(fh).unwrap_err(), BraidError::BadHandle(fh));
        assert_eq!(table.remove(fh).unwrap_err(), BraidError::BadHandle(fh));
    }

    #[test]
    fn tokens_are_unique() {
        let table = HandleTable::new();
        let a = table.insert(FileInfo::new(Box::new(NullFile), "/a", false));
        let b = table.insert(FileInfo::new(Box::new(NullFile), "/b", true));
        assert_ne!(a, b);
        assert!(table.get(b).unwrap().direct_io());
    }
}
