//! In-memory native filesystem that records every call.
//!
//! Paths are absolute, as the kernel hands them to [`NativeFs`]. Branch
//! roots are registered with [`RecordingFs::add_root`]; each root carries
//! its own space figures and an optional errno that every non-probe call
//! under it fails with. `lstat`, `statvfs` and `access` are probes: policies
//! run them to pick branches, so they never fail by injection.

use std::collections::btree_map::{BTreeMap, Entry};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::SystemTime;

use braid_kernel::{
    AccessFlags, Attr, EntryKind, Errno, NativeFile, NativeFs, OFlag, SetTime, SpaceInfo,
};

const BLOCK: u64 = 4096;

/// One recorded call: operation name and the path it touched. Handle calls
/// record the path the file was opened at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
struct Node {
    kind: EntryKind,
    mode: u32,
    uid: u32,
    gid: u32,
    data: Vec<u8>,
    target: PathBuf,
    nlink: u64,
    ino: u64,
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
}

impl Node {
    fn new(kind: EntryKind, mode: u32, ino: u64) -> Self {
        let now = SystemTime::now();
        Self {
            kind,
            mode,
            uid: 0,
            gid: 0,
            data: Vec::new(),
            target: PathBuf::new(),
            nlink: 1,
            ino,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn attr(&self, dev: u64) -> Attr {
        Attr {
            kind: self.kind,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            size: match self.kind {
                EntryKind::Symlink => self.target.as_os_str().len() as u64,
                _ => self.data.len() as u64,
            },
            nlink: self.nlink,
            ino: self.ino,
            dev,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }
}

#[derive(Debug, Clone)]
struct Root {
    space: SpaceInfo,
    fail: Option<Errno>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<PathBuf, Node>,
    roots: BTreeMap<PathBuf, Root>,
    calls: Vec<Call>,
    next_ino: u64,
}

type Hook = Arc<dyn Fn(&Call) + Send + Sync>;

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    hook: RwLock<Option<Hook>>,
}

/// Recording in-memory filesystem.
#[derive(Clone, Default)]
pub struct RecordingFs {
    inner: Arc<Inner>,
}

fn errno(e: Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

impl State {
    fn root_of(&self, path: &Path) -> Option<(&PathBuf, &Root)> {
        self.roots
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.components().count())
    }

    fn dev_of(&self, path: &Path) -> u64 {
        self.root_of(path).map(|(_, r)| r.space.fsid).unwrap_or(0)
    }

    fn injected(&self, path: &Path) -> io::Result<()> {
        match self.root_of(path).and_then(|(_, r)| r.fail) {
            Some(e) => Err(errno(e)),
            None => Ok(()),
        }
    }

    fn node(&self, path: &Path) -> io::Result<&Node> {
        self.entries.get(path).ok_or_else(|| errno(Errno::ENOENT))
    }

    fn node_mut(&mut self, path: &Path) -> io::Result<&mut Node> {
        self.entries.get_mut(path).ok_or_else(|| errno(Errno::ENOENT))
    }

    /// The parent of `path` must be an existing directory.
    fn check_parent(&self, path: &Path) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| errno(Errno::ENOENT))?;
        match self.entries.get(parent) {
            Some(node) if node.kind == EntryKind::Directory => Ok(()),
            Some(_) => Err(errno(Errno::ENOTDIR)),
            None => Err(errno(Errno::ENOENT)),
        }
    }

    fn check_vacant(&self, path: &Path) -> io::Result<()> {
        if self.entries.contains_key(path) {
            return Err(errno(Errno::EEXIST));
        }
        self.check_parent(path)
    }

    fn insert(&mut self, path: &Path, kind: EntryKind, mode: u32) -> &mut Node {
        self.next_ino += 1;
        let node = Node::new(kind, mode, self.next_ino);
        match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(mut slot) => {
                slot.insert(node);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(node),
        }
    }

    fn has_children(&self, path: &Path) -> bool {
        self.entries.keys().any(|k| k.parent() == Some(path))
    }

    /// Create `path` and any missing ancestors as directories.
    fn ensure_dirs(&mut self, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if !self.entries.contains_key(&current) {
                self.insert(&current, EntryKind::Directory, 0o755);
            }
        }
    }
}

impl RecordingFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log `op` on `path`, then run the hook outside the state lock.
    fn record(&self, op: &'static str, path: &Path) {
        let call = Call {
            op,
            path: path.to_path_buf(),
        };
        self.state().calls.push(call.clone());
        let hook = self
            .inner
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(&call);
        }
    }

    /// Register a branch root as an empty directory with plenty of space.
    ///
    /// Each root gets its own fsid.
    pub fn add_root(&self, root: impl AsRef<Path>) -> &Self {
        let root = root.as_ref();
        let mut state = self.state();
        state.ensure_dirs(root);
        let fsid = state.roots.len() as u64 + 1;
        state.roots.insert(
            root.to_path_buf(),
            Root {
                space: SpaceInfo {
                    block_size: BLOCK,
                    blocks: 1 << 30,
                    blocks_free: 1 << 30,
                    blocks_available: 1 << 30,
                    files: 1 << 20,
                    files_free: 1 << 20,
                    name_max: 255,
                    fsid,
                    read_only: false,
                },
                fail: None,
            },
        );
        self
    }

    /// Set the bytes available on `root`, rounded down to whole blocks.
    pub fn set_available(&self, root: impl AsRef<Path>, bytes: u64) -> &Self {
        self.update_root(root.as_ref(), |r| {
            r.space.blocks_available = bytes / BLOCK;
            r.space.blocks_free = bytes / BLOCK;
        })
    }

    /// Replace all space figures of `root`.
    pub fn set_space(&self, root: impl AsRef<Path>, space: SpaceInfo) -> &Self {
        self.update_root(root.as_ref(), |r| r.space = space)
    }

    /// Report `root` as mounted read-only.
    pub fn set_read_only(&self, root: impl AsRef<Path>, read_only: bool) -> &Self {
        self.update_root(root.as_ref(), |r| r.space.read_only = read_only)
    }

    /// Fail every non-probe call under `root` with `err`; `None` clears it.
    pub fn fail(&self, root: impl AsRef<Path>, err: Option<Errno>) -> &Self {
        self.update_root(root.as_ref(), |r| r.fail = err)
    }

    fn update_root(&self, root: &Path, f: impl FnOnce(&mut Root)) -> &Self {
        if let Some(r) = self.state().roots.get_mut(root) {
            f(r);
        }
        self
    }

    /// Add a directory, creating missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        self.state().ensure_dirs(path.as_ref());
        self
    }

    /// Add a file with `data`, creating missing ancestors.
    pub fn add_file(&self, path: impl AsRef<Path>, data: &[u8]) -> &Self {
        let path = path.as_ref();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            state.ensure_dirs(parent);
        }
        state.insert(path, EntryKind::File, 0o644).data = data.to_vec();
        self
    }

    /// Set the modification time of an existing entry.
    pub fn set_mtime(&self, path: impl AsRef<Path>, mtime: SystemTime) -> &Self {
        if let Some(node) = self.state().entries.get_mut(path.as_ref()) {
            node.mtime = mtime;
        }
        self
    }

    /// Run `hook` after every recorded call, outside the internal lock.
    pub fn set_hook(&self, hook: impl Fn(&Call) + Send + Sync + 'static) {
        *self.inner.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub fn clear_hook(&self) {
        *self.inner.hook.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Everything recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Paths touched by `op`, in order.
    pub fn paths_for(&self, op: &str) -> Vec<PathBuf> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.path.clone())
            .collect()
    }

    /// Calls other than probes.
    pub fn mutations(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| !matches!(c.op, "lstat" | "statvfs" | "access"))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state().entries.get(path.as_ref()).map(|n| n.data.clone())
    }

    /// Attributes without recording a call.
    pub fn peek(&self, path: impl AsRef<Path>) -> Option<Attr> {
        let state = self.state();
        let path = path.as_ref();
        state.entries.get(path).map(|n| n.attr(state.dev_of(path)))
    }
}

impl std::fmt::Debug for RecordingFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("RecordingFs")
            .field("roots", &state.roots.keys().collect::<Vec<_>>())
            .field("entries", &state.entries.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

fn resolve(time: SetTime, current: SystemTime) -> SystemTime {
    match time {
        SetTime::Omit => current,
        SetTime::Now => SystemTime::now(),
        SetTime::At(t) => t,
    }
}

impl NativeFs for RecordingFs {
    fn lstat(&self, path: &Path) -> io::Result<Attr> {
        self.record("lstat", path);
        let state = self.state();
        Ok(state.node(path)?.attr(state.dev_of(path)))
    }

    fn statvfs(&self, path: &Path) -> io::Result<SpaceInfo> {
        self.record("statvfs", path);
        let state = self.state();
        state.node(path)?;
        state
            .root_of(path)
            .map(|(_, r)| r.space)
            .ok_or_else(|| errno(Errno::ENOENT))
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.record("chmod", path);
        let mut state = self.state();
        state.injected(path)?;
        state.node_mut(path)?.mode = mode & 0o7777;
        Ok(())
    }

    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.record("lchown", path);
        let mut state = self.state();
        state.injected(path)?;
        let node = state.node_mut(path)?;
        if let Some(uid) = uid {
            node.uid = uid;
        }
        if let Some(gid) = gid {
            node.gid = gid;
        }
        Ok(())
    }

    fn utimens(&self, path: &Path, atime: SetTime, mtime: SetTime) -> io::Result<()> {
        self.record("utimens", path);
        let mut state = self.state();
        state.injected(path)?;
        let node = state.node_mut(path)?;
        node.atime = resolve(atime, node.atime);
        node.mtime = resolve(mtime, node.mtime);
        Ok(())
    }

    fn truncate(&self, path: &Path, size: u64) -> io::Result<()> {
        self.record("truncate", path);
        let mut state = self.state();
        state.injected(path)?;
        let node = state.node_mut(path)?;
        if node.kind == EntryKind::Directory {
            return Err(errno(Errno::EISDIR));
        }
        let len = usize::try_from(size).map_err(|_| errno(Errno::EFBIG))?;
        node.data.resize(len, 0);
        Ok(())
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        self.record("unlink", path);
        let mut state = self.state();
        state.injected(path)?;
        if state.node(path)?.kind == EntryKind::Directory {
            return Err(errno(Errno::EISDIR));
        }
        state.entries.remove(path);
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        self.record("rmdir", path);
        let mut state = self.state();
        state.injected(path)?;
        if state.node(path)?.kind != EntryKind::Directory {
            return Err(errno(Errno::ENOTDIR));
        }
        if state.has_children(path) {
            return Err(errno(Errno::ENOTEMPTY));
        }
        state.entries.remove(path);
        Ok(())
    }

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.record("mkdir", path);
        let mut state = self.state();
        state.injected(path)?;
        state.check_vacant(path)?;
        state.insert(path, EntryKind::Directory, mode & 0o7777);
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.record("symlink", link);
        let mut state = self.state();
        state.injected(link)?;
        state.check_vacant(link)?;
        state.insert(link, EntryKind::Symlink, 0o777).target = target.to_path_buf();
        Ok(())
    }

    fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("link", from);
        let mut state = self.state();
        state.injected(from)?;
        if state.node(from)?.kind == EntryKind::Directory {
            return Err(errno(Errno::EPERM));
        }
        state.check_vacant(to)?;
        let source = state.node_mut(from)?;
        source.nlink += 1;
        let copy = source.clone();
        state.entries.insert(to.to_path_buf(), copy);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("rename", from);
        let mut state = self.state();
        state.injected(from)?;
        let kind = state.node(from)?.kind;
        state.check_parent(to)?;
        match state.entries.get(to).map(|n| n.kind) {
            Some(EntryKind::Directory) if kind != EntryKind::Directory => {
                return Err(errno(Errno::EISDIR));
            }
            Some(existing) if existing != EntryKind::Directory && kind == EntryKind::Directory => {
                return Err(errno(Errno::ENOTDIR));
            }
            Some(EntryKind::Directory) if state.has_children(to) => {
                return Err(errno(Errno::ENOTEMPTY));
            }
            _ => {}
        }

        let moved: Vec<PathBuf> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = state.entries.remove(&old) {
                let new = match old.strip_prefix(from) {
                    Ok(rest) if !rest.as_os_str().is_empty() => to.join(rest),
                    _ => to.to_path_buf(),
                };
                state.entries.insert(new, node);
            }
        }
        Ok(())
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        self.record("readlink", path);
        let state = self.state();
        state.injected(path)?;
        let node = state.node(path)?;
        if node.kind != EntryKind::Symlink {
            return Err(errno(Errno::EINVAL));
        }
        Ok(node.target.clone())
    }

    fn access(&self, path: &Path, _mode: AccessFlags) -> io::Result<()> {
        self.record("access", path);
        self.state().node(path).map(|_| ())
    }

    fn open(&self, path: &Path, _flags: i32) -> io::Result<Box<dyn NativeFile>> {
        self.record("open", path);
        let state = self.state();
        state.injected(path)?;
        state.node(path)?;
        Ok(Box::new(RecordingFile {
            fs: self.clone(),
            path: path.to_path_buf(),
        }))
    }

    fn create(&self, path: &Path, flags: i32, mode: u32) -> io::Result<Box<dyn NativeFile>> {
        self.record("create", path);
        let mut state = self.state();
        state.injected(path)?;
        match state.entries.get_mut(path) {
            Some(_) if flags & OFlag::O_EXCL.bits() != 0 => return Err(errno(Errno::EEXIST)),
            Some(node) if node.kind == EntryKind::Directory => return Err(errno(Errno::EISDIR)),
            Some(node) => {
                if flags & OFlag::O_TRUNC.bits() != 0 {
                    node.data.clear();
                }
            }
            None => {
                state.check_parent(path)?;
                state.insert(path, EntryKind::File, mode & 0o7777);
            }
        }
        Ok(Box::new(RecordingFile {
            fs: self.clone(),
            path: path.to_path_buf(),
        }))
    }
}

/// An open file on a [`RecordingFs`]. Calls go to whatever lives at the
/// path it was opened at.
pub struct RecordingFile {
    fs: RecordingFs,
    path: PathBuf,
}

impl RecordingFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_node<T>(&self, op: &'static str, f: impl FnOnce(&mut Node) -> io::Result<T>) -> io::Result<T> {
        self.fs.record(op, &self.path);
        let mut state = self.fs.state();
        state.injected(&self.path)?;
        f(state.node_mut(&self.path)?)
    }
}

impl std::fmt::Debug for RecordingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingFile").field("path", &self.path).finish()
    }
}

impl NativeFile for RecordingFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.with_node("read", |node| {
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(node.data.len());
            let n = buf.len().min(node.data.len() - start);
            buf[..n].copy_from_slice(&node.data[start..start + n]);
            Ok(n)
        })
    }

    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<usize> {
        self.with_node("write", |node| {
            let start = usize::try_from(offset).map_err(|_| errno(Errno::EFBIG))?;
            let end = start + data.len();
            if node.data.len() < end {
                node.data.resize(end, 0);
            }
            node.data[start..end].copy_from_slice(data);
            node.mtime = SystemTime::now();
            Ok(data.len())
        })
    }

    fn set_mode(&self, mode: u32) -> io::Result<()> {
        self.with_node("fchmod", |node| {
            node.mode = mode & 0o7777;
            Ok(())
        })
    }

    fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.with_node("fchown", |node| {
            if let Some(uid) = uid {
                node.uid = uid;
            }
            if let Some(gid) = gid {
                node.gid = gid;
            }
            Ok(())
        })
    }

    fn set_len(&self, size: u64) -> io::Result<()> {
        self.with_node("ftruncate", |node| {
            let len = usize::try_from(size).map_err(|_| errno(Errno::EFBIG))?;
            node.data.resize(len, 0);
            Ok(())
        })
    }

    fn set_times(&self, atime: SetTime, mtime: SetTime) -> io::Result<()> {
        self.with_node("futimens", |node| {
            node.atime = resolve(atime, node.atime);
            node.mtime = resolve(mtime, node.mtime);
            Ok(())
        })
    }

    fn attr(&self) -> io::Result<Attr> {
        let dev = self.fs.state().dev_of(&self.path);
        self.with_node("fgetattr", |node| Ok(node.attr(dev)))
    }

    fn sync(&self, _data_only: bool) -> io::Result<()> {
        self.with_node("fsync", |_| Ok(()))
    }

    fn flush(&self) -> io::Result<()> {
        self.with_node("flush", |_| Ok(()))
    }
}
