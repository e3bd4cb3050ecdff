//! braid-types: pure data types shared across braid crates.
//!
//! Nothing here touches the filesystem. Branch roots are carried as paths,
//! credentials as plain integers, and the config file as its serde model.

mod branch;
mod config;
mod size;
mod ugid;

pub use branch::{Branch, BranchMode};
pub use config::{ConfigFile, PolicyTable};
pub use size::{format_size, parse_size};
pub use ugid::Ugid;

/// Errors from parsing branch specs, sizes, modes and config files.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid branch mode '{0}' (expected RW, RO or NC)")]
    Mode(String),
    #[error("invalid size '{0}'")]
    Size(String),
    #[error("invalid branch spec '{0}'")]
    Branch(String),
    #[error("config: {0}")]
    Config(String),
}
