//! Locating, loading and overriding the braid config file.
//!
//! | Source | Wins over |
//! |--------|-----------|
//! | `--branch`, `--search`, ... flags | the file |
//! | `--config <path>` | the default path |
//! | `$XDG_CONFIG_HOME/braid/config.toml` | built-in defaults |

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use braid_kernel::{Config, LocalFs, PolicyRegistry};
use braid_types::{ConfigFile, PolicyTable};
use clap::Args;
use directories::BaseDirs;
use tracing::debug;

/// Config flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Config file (default: $XDG_CONFIG_HOME/braid/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Branch spec `path[=RW|RO|NC[,MINFREE]]`; repeat in priority order.
    /// Replaces the file's branch list.
    #[arg(long = "branch", short = 'b', global = true, value_name = "SPEC")]
    pub branches: Vec<String>,

    /// Search policy name.
    #[arg(long, global = true)]
    pub search: Option<String>,

    /// Create policy name.
    #[arg(long, global = true)]
    pub create: Option<String>,

    /// Action policy name.
    #[arg(long, global = true)]
    pub action: Option<String>,

    /// Global free-space threshold, e.g. `4G`.
    #[arg(long, global = true, value_name = "SIZE")]
    pub minfreespace: Option<String>,
}

impl ConfigArgs {
    /// The flags as a file model, for merging over the loaded file.
    fn overrides(&self) -> ConfigFile {
        ConfigFile {
            branches: self.branches.clone(),
            minfreespace: self.minfreespace.clone(),
            policy: PolicyTable {
                search: self.search.clone(),
                create: self.create.clone(),
                action: self.action.clone(),
                func: Default::default(),
            },
        }
    }
}

/// Default config location.
///
/// Uses `$XDG_CONFIG_HOME/braid` or falls back to `~/.config/braid`.
pub fn default_config_path() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".config"))
        .join("braid")
        .join("config.toml")
}

fn home_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Read the config file, or an empty model when the default path is absent.
///
/// An explicit `--config` that does not exist is an error.
pub fn load_file(args: &ConfigArgs) -> Result<ConfigFile> {
    let (path, explicit) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (default_config_path(), false),
    };
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ConfigFile::default());
    }
    read_file(&path)
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let file = ConfigFile::from_toml(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    debug!(path = %path.display(), branches = file.branches.len(), "config loaded");
    Ok(file)
}

/// The merged file model: file first, flags on top.
pub fn resolve_file(args: &ConfigArgs) -> Result<ConfigFile> {
    Ok(load_file(args)?.merge(args.overrides()))
}

/// Build and validate the live config: policies known, roots present.
pub fn build(args: &ConfigArgs) -> Result<Config> {
    let file = resolve_file(args)?;
    if file.branches.is_empty() {
        bail!(
            "no branches configured (use --branch or set `branches` in {})",
            default_config_path().display()
        );
    }
    let config = Config::from_file(&file, &PolicyRegistry::builtin())
        .context("Invalid configuration")?;
    config
        .check_roots(&LocalFs)
        .context("Branch root check failed")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "branches = [\"/x\"]\nminfreespace = \"1G\"\n[policy]\ncreate = \"mfs\"\n",
        )
        .unwrap();

        let args = ConfigArgs {
            config: Some(path),
            create: Some("lfs".into()),
            ..Default::default()
        };
        let file = resolve_file(&args).unwrap();
        assert_eq!(file.branches, vec!["/x".to_string()]);
        assert_eq!(file.minfreespace.as_deref(), Some("1G"));
        assert_eq!(file.policy.create.as_deref(), Some("lfs"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = ConfigArgs {
            config: Some(dir.path().join("nope.toml")),
            ..Default::default()
        };
        assert!(load_file(&args).is_err());
    }

    #[test]
    fn build_requires_branches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            ..Default::default()
        };
        let err = build(&args).unwrap_err();
        assert!(err.to_string().contains("no branches"), "{err}");
    }

    #[test]
    fn default_path_ends_in_braid_config() {
        assert!(default_config_path().ends_with("braid/config.toml"));
    }
}
