//! Handler for `lockstep lock`.

use miette::Result;

use lockstep_ops::ops_lock::{self, LockOptions};
use lockstep_ops::ops_setup::ProjectPaths;

pub fn exec(paths: &ProjectPaths, frozen: bool, preserve_unknown: bool) -> Result<()> {
    let opts = LockOptions {
        frozen,
        preserve_unknown,
    };
    ops_lock::lock(paths, &opts)
}
