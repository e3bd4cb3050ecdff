//! The live branch set and the lock that guards it.
//!
//! A [`Config`] is never edited in place. Reconfiguration builds a new one
//! and swaps it into the [`ConfigHolder`] under the exclusive lock; every
//! path-based call holds the shared lock from policy selection through the
//! last branch operation, so it sees one branch list from start to finish.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use braid_types::{format_size, Branch, ConfigFile, PolicyTable};
use nix::errno::Errno;
use tracing::info;

use crate::error::{errno_of, BraidError, Result};
use crate::native::NativeFs;
use crate::policy::{Category, Op, Policy, PolicyRegistry, PolicyResult};

/// Global free-space threshold when none is configured: 4 GiB.
pub const DEFAULT_MIN_FREE_SPACE: u64 = 4 * 1024 * 1024 * 1024;

/// Branches plus the policies that pick among them.
#[derive(Debug, Clone)]
pub struct Config {
    branches: Vec<Branch>,
    search: Policy,
    create: Policy,
    action: Policy,
    overrides: HashMap<Op, Policy>,
    min_free_space: u64,
}

impl Config {
    /// Config over `branches` with the default policies.
    ///
    /// The list must be non-empty and its roots distinct.
    pub fn new(branches: Vec<Branch>) -> Result<Self> {
        if branches.is_empty() {
            return Err(BraidError::Config("no branches configured".into()));
        }
        let mut seen = HashSet::new();
        for branch in &branches {
            if !seen.insert(branch.root()) {
                return Err(BraidError::Config(format!(
                    "branch {} listed twice",
                    branch.root().display()
                )));
            }
        }
        Ok(Self {
            branches,
            search: Policy::default_for(Category::Search),
            create: Policy::default_for(Category::Create),
            action: Policy::default_for(Category::Action),
            overrides: HashMap::new(),
            min_free_space: DEFAULT_MIN_FREE_SPACE,
        })
    }

    /// Build from a parsed config file, resolving policy names in `registry`.
    pub fn from_file(file: &ConfigFile, registry: &PolicyRegistry) -> Result<Self> {
        let mut config = Self::new(file.parse_branches()?)?;
        if let Some(bytes) = file.min_free_space()? {
            config = config.with_min_free_space(bytes);
        }

        let by_category = [
            (Category::Search, &file.policy.search),
            (Category::Create, &file.policy.create),
            (Category::Action, &file.policy.action),
        ];
        for (category, name) in by_category {
            if let Some(name) = name {
                config = config.with_policy(lookup(registry, name, category)?);
            }
        }

        for (op, name) in &file.policy.func {
            let op: Op = op.parse()?;
            let policy = lookup(registry, name, op.category())?;
            config = config.with_override(op, policy)?;
        }
        Ok(config)
    }

    /// Replace the default policy of `policy`'s category.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        match policy.category() {
            Category::Search => self.search = policy,
            Category::Create => self.create = policy,
            Category::Action => self.action = policy,
        }
        self
    }

    /// Use `policy` for `op` instead of the category default.
    pub fn with_override(mut self, op: Op, policy: Policy) -> Result<Self> {
        if policy.category() != op.category() {
            return Err(BraidError::Config(format!(
                "{op} needs a {} policy, got {} {}",
                op.category(),
                policy.category(),
                policy.name()
            )));
        }
        self.overrides.insert(op, policy);
        Ok(self)
    }

    pub fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space = bytes;
        self
    }

    /// Check that every root exists and is a directory.
    pub fn check_roots(&self, native: &dyn NativeFs) -> Result<()> {
        for branch in &self.branches {
            let attr = native.lstat(branch.root()).map_err(|e| {
                BraidError::Config(format!(
                    "branch {}: {}",
                    branch.root().display(),
                    errno_of(&e).desc()
                ))
            })?;
            if !attr.is_dir() {
                return Err(BraidError::Config(format!(
                    "branch {}: {}",
                    branch.root().display(),
                    Errno::ENOTDIR.desc()
                )));
            }
        }
        Ok(())
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn min_free_space(&self) -> u64 {
        self.min_free_space
    }

    /// The category default, ignoring overrides.
    pub fn policy(&self, category: Category) -> Policy {
        match category {
            Category::Search => self.search,
            Category::Create => self.create,
            Category::Action => self.action,
        }
    }

    /// The policy `op` runs with.
    pub fn policy_for(&self, op: Op) -> Policy {
        self.overrides
            .get(&op)
            .copied()
            .unwrap_or_else(|| self.policy(op.category()))
    }

    /// Candidate branches for `op` on the union-relative `path`.
    pub fn select<'a>(&'a self, op: Op, native: &dyn NativeFs, path: &Path) -> PolicyResult<'a> {
        self.policy_for(op)
            .select(native, &self.branches, path, self.min_free_space)
    }

    /// The first candidate for `op`: single-branch calls use only this one.
    pub fn select_first<'a>(&'a self, op: Op, native: &dyn NativeFs, path: &Path) -> Result<&'a Branch> {
        self.select(op, native, path)?
            .first()
            .copied()
            .ok_or(BraidError::no_branch(Errno::ENOENT))
    }

    /// First branch where `path` is found by the getattr policy.
    pub fn search<'a>(&'a self, native: &dyn NativeFs, path: &Path) -> Result<&'a Branch> {
        self.select_first(Op::Getattr, native, path)
    }

    /// Render back to the file model, e.g. for `braid show`.
    pub fn to_file(&self) -> ConfigFile {
        let func: BTreeMap<String, String> = self
            .overrides
            .iter()
            .map(|(op, policy)| (op.name().to_string(), policy.name().to_string()))
            .collect();
        ConfigFile {
            branches: self.branches.iter().map(Branch::to_string).collect(),
            minfreespace: Some(format_size(self.min_free_space)),
            policy: PolicyTable {
                search: Some(self.search.name().to_string()),
                create: Some(self.create.name().to_string()),
                action: Some(self.action.name().to_string()),
                func,
            },
        }
    }
}

fn lookup(registry: &PolicyRegistry, name: &str, category: Category) -> Result<Policy> {
    registry
        .get(name, category)
        .ok_or_else(|| BraidError::Config(format!("unknown {category} policy '{name}'")))
}

/// Swappable holder for the live [`Config`].
///
/// Reads take the shared lock and keep it for as long as the returned guard
/// lives. [`replace`](Self::replace) takes the exclusive lock, so it waits for
/// every in-flight read to finish.
#[derive(Debug)]
pub struct ConfigHolder {
    current: RwLock<Arc<Config>>,
    reads: AtomicU64,
}

impl ConfigHolder {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            reads: AtomicU64::new(0),
        }
    }

    /// Shared acquisition, held until the guard drops.
    pub fn read(&self) -> ConfigReadGuard<'_> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        ConfigReadGuard {
            guard: self.current.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// The current config, without holding the lock afterwards.
    pub fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.read())
    }

    /// Publish `config`, returning the one it replaced.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        let branches = config.branches.len();
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let old = std::mem::replace(&mut *current, Arc::new(config));
        drop(current);
        info!(
            branches,
            previous = old.branches.len(),
            "configuration replaced"
        );
        old
    }

    /// How many shared acquisitions have been made so far.
    pub fn shared_acquisitions(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

/// Shared hold on the live config.
pub struct ConfigReadGuard<'a> {
    guard: RwLockReadGuard<'a, Arc<Config>>,
}

impl Deref for ConfigReadGuard<'_> {
    type Target = Arc<Config>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::BranchMode;
    use rstest::rstest;

    fn rw(root: &str) -> Branch {
        Branch::new(root, BranchMode::ReadWrite)
    }

    #[test]
    fn empty_branch_list_is_rejected() {
        assert!(matches!(Config::new(vec![]), Err(BraidError::Config(_))));
    }

    #[test]
    fn duplicate_roots_are_rejected() {
        let err = Config::new(vec![rw("/a"), rw("/b"), rw("/a")]).unwrap_err();
        assert!(err.to_string().contains("/a"));
    }

    #[test]
    fn defaults() {
        let config = Config::new(vec![rw("/a")]).unwrap();
        assert_eq!(config.min_free_space(), DEFAULT_MIN_FREE_SPACE);
        assert_eq!(config.policy(Category::Search).name(), "ff");
        assert_eq!(config.policy(Category::Create).name(), "epmfs");
        assert_eq!(config.policy(Category::Action).name(), "epall");
    }

    #[rstest]
    #[case::chmod(Op::Chmod, "all")]
    #[case::chown(Op::Chown, "epall")]
    #[case::mkdir(Op::Mkdir, "epmfs")]
    fn overrides_apply_per_op(#[case] op: Op, #[case] expected: &str) {
        let registry = PolicyRegistry::builtin();
        let config = Config::new(vec![rw("/a")])
            .unwrap()
            .with_override(Op::Chmod, registry.get("all", Category::Action).unwrap())
            .unwrap();
        assert_eq!(config.policy_for(op).name(), expected);
    }

    #[test]
    fn override_must_match_category() {
        let registry = PolicyRegistry::builtin();
        let search = registry.get("ff", Category::Search).unwrap();
        let err = Config::new(vec![rw("/a")])
            .unwrap()
            .with_override(Op::Mkdir, search)
            .unwrap_err();
        assert!(matches!(err, BraidError::Config(_)));
    }

    #[test]
    fn from_file_resolves_everything() {
        let file = ConfigFile::from_toml(
            r#"
            branches = ["/a", "/b=NC,1G", "/c=RO"]
            minfreespace = "10M"

            [policy]
            create = "mfs"

            [policy.func]
            rename = "ff"
            "#,
        )
        .unwrap();
        let config = Config::from_file(&file, &PolicyRegistry::builtin()).unwrap();

        assert_eq!(config.branches().len(), 3);
        assert_eq!(config.branches()[1].mode(), BranchMode::NoCreate);
        assert_eq!(config.min_free_space(), 10 * 1024 * 1024);
        assert_eq!(config.policy(Category::Create).name(), "mfs");
        assert_eq!(config.policy(Category::Search).name(), "ff");
        assert_eq!(config.policy_for(Op::Rename).name(), "ff");
        assert_eq!(config.policy_for(Op::Rename).category(), Category::Action);
    }

    #[rstest]
    #[case::unknown_policy("[policy]\ncreate = \"random\"")]
    #[case::unknown_op("[policy.func]\nfrobnicate = \"ff\"")]
    #[case::no_branches("branches = []")]
    fn from_file_rejects(#[case] extra: &str) {
        let text = if extra.starts_with("branches") {
            extra.to_string()
        } else {
            format!("branches = [\"/a\"]\n{extra}")
        };
        let file = ConfigFile::from_toml(&text).unwrap();
        assert!(Config::from_file(&file, &PolicyRegistry::builtin()).is_err());
    }

    #[test]
    fn to_file_round_trips_through_from_file() {
        let registry = PolicyRegistry::builtin();
        let config = Config::new(vec![rw("/a"), Branch::new("/b", BranchMode::ReadOnly)])
            .unwrap()
            .with_min_free_space(1024 * 1024)
            .with_override(Op::Unlink, registry.get("ff", Category::Action).unwrap())
            .unwrap();
        let again = Config::from_file(&config.to_file(), &registry).unwrap();

        assert_eq!(again.branches(), config.branches());
        assert_eq!(again.min_free_space(), config.min_free_space());
        assert_eq!(again.policy_for(Op::Unlink).name(), "ff");
    }

    #[test]
    fn replace_returns_previous_and_counts_reads() {
        let holder = ConfigHolder::new(Config::new(vec![rw("/a")]).unwrap());
        assert_eq!(holder.shared_acquisitions(), 0);

        let before = holder.snapshot();
        let old = holder.replace(Config::new(vec![rw("/b"), rw("/c")]).unwrap());
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(holder.read().branches().len(), 2);
        assert_eq!(holder.shared_acquisitions(), 2);
    }
}
