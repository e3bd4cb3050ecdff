//! Test utilities for braid.
//!
//! - [`RecordingFs`]: an in-memory [`NativeFs`](braid_kernel::NativeFs) that
//!   logs every call, with per-branch free space and errno injection.
//! - [`StubCredentials`]: identity switching that only records what it was
//!   asked to do.
//!
//! Both are cheap to clone; clones share state, so a test can hand one to a
//! `Union` and keep the other to inspect.

mod creds;
mod fs;

pub use creds::StubCredentials;
pub use fs::{Call, RecordingFile, RecordingFs};

use std::sync::Arc;

use braid_kernel::{Config, ConfigHolder, IdentityContext, Union};

/// A union over `fs` with identity handled by `creds`.
pub fn union(fs: &RecordingFs, config: Config, creds: &StubCredentials) -> Union {
    Union::new(
        Arc::new(ConfigHolder::new(config)),
        Arc::new(fs.clone()),
        IdentityContext::new(Arc::new(creds.clone())),
    )
}
