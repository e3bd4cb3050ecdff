use std::path::Path;

use braid_types::Ugid;

use crate::aggregate::reduce;
use crate::clone::clone_path;
use crate::error::Result;
use crate::executor::apply_to_all;
use crate::path::{normalize, parent};
use crate::policy::Op;
use crate::union::Union;

impl Union {
    /// Hard-link `from` to `to` on every branch the link policy picks for
    /// `from`. A link never crosses branches: each copy links within its own.
    pub fn link(&self, caller: Ugid, from: &Path, to: &Path) -> Result<()> {
        let to = normalize(to)?;
        self.path_call(Op::Link.name(), caller, from, |config, from| {
            let candidates = config.select(Op::Link, self.native(), from)?;
            let to_dir = parent(&to);
            let source = config.search(self.native(), to_dir)?;
            reduce(apply_to_all(&candidates, from, |branch, full| {
                clone_path(self.native(), source, branch, to_dir)?;
                self.native().link(full, &branch.join(&to))
            }))
        })
    }
}
