//! braid command-line tool.
//!
//! Each subcommand is one union call against the configured branches, run
//! as the invoking user. Useful for inspecting what a policy would pick and
//! for maintaining a pool of disks without mounting it.

pub mod config;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context, Result};
use braid_kernel::path::{normalize, parent};
use braid_kernel::{
    Attr, Category, EntryKind, Errno, OFlag, Op, SetTime, SpaceInfo, Ugid, Union,
};
use braid_types::{format_size, parse_size};
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::config::ConfigArgs;

#[derive(Debug, Parser)]
#[command(name = "braid", version, about = "Union filesystem calls over a set of branches")]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the effective configuration.
    Show,
    /// Print the branches a policy picks for an operation on a path.
    Select {
        /// Operation name, e.g. `mkdir`, `chmod`, `getattr`.
        op: String,
        path: PathBuf,
    },
    /// Change permission bits on every copy.
    Chmod {
        /// Octal mode, e.g. `640`.
        mode: String,
        path: PathBuf,
    },
    /// Change owner on every copy (does not follow symlinks).
    Chown {
        /// `uid`, `uid:gid` or `:gid`.
        owner: String,
        path: PathBuf,
    },
    /// Set times to now, creating an empty file if the path is missing.
    Touch { path: PathBuf },
    /// Resize every copy.
    Truncate {
        /// Size in bytes, `K/M/G/T` suffixes allowed.
        size: String,
        path: PathBuf,
    },
    /// Remove a file from every branch.
    Rm { path: PathBuf },
    /// Remove an empty directory from every branch.
    Rmdir { path: PathBuf },
    /// Create a directory on the create policy's branches.
    Mkdir {
        #[arg(short, long, default_value = "755")]
        mode: String,
        path: PathBuf,
    },
    /// Create a hard link, or a symlink with `-s`.
    Ln {
        #[arg(short, long)]
        symbolic: bool,
        target: PathBuf,
        link: PathBuf,
    },
    /// Rename on every branch holding the source.
    Mv { from: PathBuf, to: PathBuf },
    /// Attributes of the first copy found.
    Stat { path: PathBuf },
    /// Write a file's contents to stdout.
    Cat { path: PathBuf },
    /// Combined space across the branches' filesystems.
    Statfs {
        #[arg(default_value = "/")]
        path: PathBuf,
    },
}

/// Parse the process arguments and run the command, printing to stdout.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let stdout = io::stdout();
    execute(cli, &mut stdout.lock())
}

/// Run a parsed command, writing results to `out`.
pub fn execute(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let union = Union::local(config::build(&cli.config)?);
    let runner = Runner {
        union: &union,
        caller: union.identity().current(),
        json: cli.json,
    };
    runner.run(cli.command, out)
}

struct Runner<'a> {
    union: &'a Union,
    caller: Ugid,
    json: bool,
}

impl Runner<'_> {
    fn run(&self, command: Command, out: &mut dyn Write) -> Result<()> {
        let (union, caller) = (self.union, self.caller);
        match command {
            Command::Show => self.show(out)?,
            Command::Select { op, path } => self.select(&op, &path, out)?,
            Command::Chmod { mode, path } => union
                .chmod(caller, &path, parse_mode(&mode)?)
                .with_context(|| format!("chmod {}", path.display()))?,
            Command::Chown { owner, path } => {
                let (uid, gid) = parse_owner(&owner)?;
                union
                    .chown(caller, &path, uid, gid)
                    .with_context(|| format!("chown {}", path.display()))?
            }
            Command::Touch { path } => self.touch(&path)?,
            Command::Truncate { size, path } => union
                .truncate(caller, &path, parse_size(&size)?)
                .with_context(|| format!("truncate {}", path.display()))?,
            Command::Rm { path } => union
                .unlink(caller, &path)
                .with_context(|| format!("rm {}", path.display()))?,
            Command::Rmdir { path } => union
                .rmdir(caller, &path)
                .with_context(|| format!("rmdir {}", path.display()))?,
            Command::Mkdir { mode, path } => union
                .mkdir(caller, &path, parse_mode(&mode)?)
                .with_context(|| format!("mkdir {}", path.display()))?,
            Command::Ln {
                symbolic: true,
                target,
                link,
            } => union
                .symlink(caller, &target, &link)
                .with_context(|| format!("ln -s {}", link.display()))?,
            Command::Ln { target, link, .. } => union
                .link(caller, &target, &link)
                .with_context(|| format!("ln {}", link.display()))?,
            Command::Mv { from, to } => union
                .rename(caller, &from, &to)
                .with_context(|| format!("mv {} {}", from.display(), to.display()))?,
            Command::Stat { path } => {
                let attr = union
                    .getattr(caller, &path)
                    .with_context(|| format!("stat {}", path.display()))?;
                self.print_attr(&path, &attr, out)?
            }
            Command::Cat { path } => self.cat(&path, out)?,
            Command::Statfs { path } => {
                let space = union
                    .statfs(caller, &path)
                    .with_context(|| format!("statfs {}", path.display()))?;
                self.print_space(&space, out)?
            }
        }
        Ok(())
    }

    fn show(&self, out: &mut dyn Write) -> Result<()> {
        let file = self.union.config().snapshot().to_file();
        if self.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&file)?)?;
        } else {
            write!(out, "{}", file.to_toml()?)?;
        }
        Ok(())
    }

    fn select(&self, op: &str, path: &Path, out: &mut dyn Write) -> Result<()> {
        let op: Op = op.parse()?;
        let rel = normalize(path)?;
        // creation is decided on the parent, the way the call itself does it
        let target = match op.category() {
            Category::Create => parent(&rel),
            Category::Search | Category::Action => rel.as_path(),
        };
        let config = self.union.config().snapshot();
        let policy = config.policy_for(op);
        let picked = config
            .select(op, self.union.native(), target)
            .with_context(|| format!("{op} {}", path.display()))?;
        let roots: Vec<String> = picked.iter().map(|b| b.root().display().to_string()).collect();

        if self.json {
            let value = json!({ "op": op.name(), "policy": policy.name(), "branches": roots });
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            for root in roots {
                writeln!(out, "{root}")?;
            }
        }
        Ok(())
    }

    fn touch(&self, path: &Path) -> Result<()> {
        let (union, caller) = (self.union, self.caller);
        match union.getattr(caller, path) {
            Ok(_) => union
                .utimens(caller, path, SetTime::Now, SetTime::Now)
                .with_context(|| format!("touch {}", path.display())),
            Err(e) if e.errno() == Errno::ENOENT => {
                let reply = union
                    .create(caller, path, OFlag::O_WRONLY.bits(), 0o644)
                    .with_context(|| format!("touch {}", path.display()))?;
                union.release(reply.fh)?;
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("touch {}", path.display())),
        }
    }

    fn cat(&self, path: &Path, out: &mut dyn Write) -> Result<()> {
        let reply = self
            .union
            .open(self.caller, path, OFlag::O_RDONLY.bits())
            .with_context(|| format!("cat {}", path.display()))?;
        let copied = copy_handle(self.union, reply.fh, out);
        self.union.release(reply.fh)?;
        copied
    }

    fn print_attr(&self, path: &Path, attr: &Attr, out: &mut dyn Write) -> Result<()> {
        let mtime = attr
            .mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if self.json {
            let value = json!({
                "path": path.display().to_string(),
                "kind": kind_name(attr.kind),
                "mode": format!("{:o}", attr.mode),
                "uid": attr.uid,
                "gid": attr.gid,
                "size": attr.size,
                "nlink": attr.nlink,
                "mtime": mtime,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            writeln!(
                out,
                "{} {:04o} {}:{} {} {}",
                kind_name(attr.kind),
                attr.mode,
                attr.uid,
                attr.gid,
                attr.size,
                path.display()
            )?;
        }
        Ok(())
    }

    fn print_space(&self, space: &SpaceInfo, out: &mut dyn Write) -> Result<()> {
        if self.json {
            let value = json!({
                "block_size": space.block_size,
                "blocks": space.blocks,
                "blocks_free": space.blocks_free,
                "blocks_available": space.blocks_available,
                "files": space.files,
                "files_free": space.files_free,
                "name_max": space.name_max,
                "read_only": space.read_only,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            writeln!(
                out,
                "total {}  available {}{}",
                format_size(space.total()),
                format_size(space.available()),
                if space.read_only { "  (read-only)" } else { "" }
            )?;
        }
        Ok(())
    }
}

fn copy_handle(union: &Union, fh: u64, out: &mut dyn Write) -> Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut offset = 0u64;
    loop {
        let n = union.read(fh, &mut buf, offset)?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
    }
}

fn kind_name(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Directory => "dir",
        EntryKind::Symlink => "symlink",
        EntryKind::Other => "other",
    }
}

/// Octal permission bits.
pub fn parse_mode(s: &str) -> Result<u32> {
    let mode = u32::from_str_radix(s, 8).with_context(|| format!("invalid mode '{s}'"))?;
    if mode > 0o7777 {
        bail!("invalid mode '{s}'");
    }
    Ok(mode)
}

/// `uid`, `uid:gid` or `:gid`. Missing parts are left unchanged.
pub fn parse_owner(s: &str) -> Result<(Option<u32>, Option<u32>)> {
    let (uid, gid) = match s.split_once(':') {
        Some((uid, gid)) => (uid, gid),
        None => (s, ""),
    };
    let parse = |part: &str| -> Result<Option<u32>> {
        if part.is_empty() {
            Ok(None)
        } else {
            part.parse()
                .map(Some)
                .with_context(|| format!("invalid owner '{s}'"))
        }
    };
    let owner = (parse(uid)?, parse(gid)?);
    if owner == (None, None) {
        bail!("invalid owner '{s}'");
    }
    Ok(owner)
}
