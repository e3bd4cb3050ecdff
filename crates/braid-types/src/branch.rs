//! Branches: the directory trees that make up a union.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::ParseError;
use crate::size::{format_size, parse_size};

/// Write mode of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BranchMode {
    /// Eligible for every operation.
    #[default]
    ReadWrite,
    /// Never written to. Only searched.
    ReadOnly,
    /// Existing files may be modified, but nothing new is created here.
    NoCreate,
}

impl BranchMode {
    /// True if new files and directories may be created on this branch.
    pub fn allows_create(self) -> bool {
        matches!(self, BranchMode::ReadWrite)
    }

    /// True if existing entries on this branch may be modified.
    pub fn allows_write(self) -> bool {
        !matches!(self, BranchMode::ReadOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BranchMode::ReadWrite => "RW",
            BranchMode::ReadOnly => "RO",
            BranchMode::NoCreate => "NC",
        }
    }
}

impl fmt::Display for BranchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RW" => Ok(BranchMode::ReadWrite),
            "RO" => Ok(BranchMode::ReadOnly),
            "NC" => Ok(BranchMode::NoCreate),
            _ => Err(ParseError::Mode(s.to_string())),
        }
    }
}

/// One directory tree in the union.
///
/// Branches are immutable values. Reconfiguration builds new ones and
/// publishes a whole new branch list; nothing edits a branch in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    root: PathBuf,
    mode: BranchMode,
    /// 0 means "use the global default".
    min_free_space: u64,
}

impl Branch {
    /// A read-write branch that inherits the global free-space threshold.
    pub fn new(root: impl Into<PathBuf>, mode: BranchMode) -> Self {
        Self {
            root: root.into(),
            mode,
            min_free_space: 0,
        }
    }

    /// Override the free-space threshold for this branch only.
    pub fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> BranchMode {
        self.mode
    }

    /// The branch's own threshold, 0 when it inherits.
    pub fn min_free_space(&self) -> u64 {
        self.min_free_space
    }

    /// Threshold to apply to this branch given the caller's default.
    pub fn effective_min_free_space(&self, default: u64) -> u64 {
        if self.min_free_space == 0 {
            default
        } else {
            self.min_free_space
        }
    }

    /// Absolute path of `rel` inside this branch.
    ///
    /// Leading `/` on `rel` is ignored, so union paths (`/a/b`) and
    /// relative paths (`a/b`) land in the same place.
    pub fn join(&self, rel: &Path) -> PathBuf {
        let rel = rel.strip_prefix("/").unwrap_or(rel);
        if rel.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.root.display(), self.mode)?;
        if self.min_free_space != 0 {
            write!(f, ",{}", format_size(self.min_free_space))?;
        }
        Ok(())
    }
}

/// Parses `path[=MODE[,MINFREESPACE]]`.
///
/// The split happens on the last `=`, and only if what follows parses as a
/// mode; otherwise the whole string is taken as the path.
impl FromStr for Branch {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Branch(s.to_string()));
        }

        if let Some((path, opts)) = s.rsplit_once('=') {
            let (mode, size) = match opts.split_once(',') {
                Some((mode, size)) => (mode, Some(size)),
                None => (opts, None),
            };
            if let Ok(mode) = mode.parse::<BranchMode>() {
                if path.is_empty() {
                    return Err(ParseError::Branch(s.to_string()));
                }
                let mut branch = Branch::new(path, mode);
                if let Some(size) = size {
                    branch = branch.with_min_free_space(parse_size(size)?);
                }
                return Ok(branch);
            }
        }

        Ok(Branch::new(s, BranchMode::ReadWrite))
    }
}
