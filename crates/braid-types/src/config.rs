//! Serde model of the braid config file.
//!
//! ```toml
//! branches = ["/mnt/disk1=RW", "/mnt/disk2=NC,8G"]
//! minfreespace = "4G"
//!
//! [policy]
//! search = "ff"
//! create = "epmfs"
//! action = "epall"
//!
//! [policy.func]
//! chmod = "all"
//! ```
//!
//! This is only the file shape. Policy names are resolved and the
//! branch list validated by the kernel when it builds a live config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::size::parse_size;
use crate::ParseError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Branch specs, in priority order.
    pub branches: Vec<String>,
    /// Global free-space threshold, e.g. `"4G"`.
    pub minfreespace: Option<String>,
    pub policy: PolicyTable,
}

/// Policy names by category, plus per-operation overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyTable {
    pub search: Option<String>,
    pub create: Option<String>,
    pub action: Option<String>,
    /// Operation name → policy name, e.g. `chmod = "all"`.
    pub func: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn from_toml(text: &str) -> Result<Self, ParseError> {
        toml::from_str(text).map_err(|e| ParseError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ParseError> {
        toml::to_string_pretty(self).map_err(|e| ParseError::Config(e.to_string()))
    }

    /// Parse every branch spec, keeping order.
    pub fn parse_branches(&self) -> Result<Vec<Branch>, ParseError> {
        self.branches.iter().map(|spec| spec.parse()).collect()
    }

    /// The global threshold in bytes, if one is set.
    pub fn min_free_space(&self) -> Result<Option<u64>, ParseError> {
        self.minfreespace.as_deref().map(parse_size).transpose()
    }

    /// Overlay `other` on top of `self`: any field set in `other` wins.
    ///
    /// Used to apply command-line overrides to a loaded file.
    pub fn merge(mut self, other: ConfigFile) -> Self {
        if !other.branches.is_empty() {
            self.branches = other.branches;
        }
        if other.minfreespace.is_some() {
            self.minfreespace = other.minfreespace;
        }
        if other.policy.search.is_some() {
            self.policy.search = other.policy.search;
        }
        if other.policy.create.is_some() {
            self.policy.create = other.policy.create;
        }
        if other.policy.action.is_some() {
            self.policy.action = other.policy.action;
        }
        self.policy.func.extend(other.policy.func);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BranchMode;

    const SAMPLE: &str = r#"
branches = ["/mnt/disk1=RW", "/mnt/disk2=NC,8G", "/mnt/archive=RO"]
minfreespace = "4G"

[policy]
create = "epmfs"

[policy.func]
chmod = "all"
"#;

    #[test]
    fn parses_sample() {
        let file = ConfigFile::from_toml(SAMPLE).unwrap();
        let branches = file.parse_branches().unwrap();
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[1].mode(), BranchMode::NoCreate);
        assert_eq!(branches[1].min_free_space(), 8 << 30);
        assert_eq!(file.min_free_space().unwrap(), Some(4 << 30));
        assert_eq!(file.policy.create.as_deref(), Some("epmfs"));
        assert_eq!(file.policy.search, None);
        assert_eq!(file.policy.func.get("chmod").map(String::as_str), Some("all"));
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(ConfigFile::from_toml("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = ConfigFile::from_toml("branchez = []").unwrap_err();
        assert!(matches!(err, ParseError::Config(_)));
    }

    #[test]
    fn merge_prefers_overrides() {
        let base = ConfigFile::from_toml(SAMPLE).unwrap();
        let mut over = ConfigFile::default();
        over.branches = vec!["/tmp/x".into()];
        over.policy.action = Some("all".into());
        over.policy.func.insert("chown".into(), "ff".into());

        let merged = base.merge(over);
        assert_eq!(merged.branches, vec!["/tmp/x".to_string()]);
        assert_eq!(merged.minfreespace.as_deref(), Some("4G"));
        assert_eq!(merged.policy.create.as_deref(), Some("epmfs"));
        assert_eq!(merged.policy.action.as_deref(), Some("all"));
        assert_eq!(merged.policy.func.len(), 2);
    }

    #[test]
    fn to_toml_parses_back() {
        let file = ConfigFile::from_toml(SAMPLE).unwrap();
        let text = file.to_toml().unwrap();
        assert_eq!(ConfigFile::from_toml(&text).unwrap(), file);
    }
}
