use std::collections::HashSet;
use std::path::Path;

use braid_types::Ugid;

use crate::aggregate::Accumulator;
use crate::error::{errno_of, Result};
use crate::executor::Outcome;
use crate::native::SpaceInfo;
use crate::union::Union;

impl Union {
    /// Space across the whole union.
    ///
    /// Every branch is asked, whatever the path. Branches sharing a
    /// filesystem (same fsid) count once. Block counts are rescaled to the
    /// smallest block size seen.
    pub fn statfs(&self, caller: Ugid, path: &Path) -> Result<SpaceInfo> {
        self.path_call("statfs", caller, path, |config, _| {
            let mut acc = Accumulator::default();
            let mut seen = HashSet::new();
            let mut distinct = Vec::new();
            for branch in config.branches() {
                match self.native().statvfs(branch.root()) {
                    Ok(space) => {
                        acc = acc.fold(Outcome::Success);
                        if seen.insert(space.fsid) {
                            distinct.push(space);
                        }
                    }
                    Err(e) => acc = acc.fold(Outcome::Failure(errno_of(&e))),
                }
            }
            acc.finish()?;
            Ok(combine(&distinct))
        })
    }
}

fn combine(spaces: &[SpaceInfo]) -> SpaceInfo {
    let block_size = spaces
        .iter()
        .map(|s| s.block_size)
        .filter(|&b| b > 0)
        .min()
        .unwrap_or(1);
    let scale = |blocks: u64, size: u64| blocks.saturating_mul(size) / block_size;

    spaces.iter().fold(
        SpaceInfo {
            block_size,
            name_max: u64::MAX,
            read_only: !spaces.is_empty(),
            ..SpaceInfo::default()
        },
        |acc, s| SpaceInfo {
            block_size,
            blocks: acc.blocks.saturating_add(scale(s.blocks, s.block_size)),
            blocks_free: acc.blocks_free.saturating_add(scale(s.blocks_free, s.block_size)),
            blocks_available: acc
                .blocks_available
                .saturating_add(scale(s.blocks_available, s.block_size)),
            files: acc.files.saturating_add(s.files),
            files_free: acc.files_free.saturating_add(s.files_free),
            name_max: acc.name_max.min(s.name_max),
            fsid: 0,
            read_only: acc.read_only && s.read_only,
        },
    )
}
