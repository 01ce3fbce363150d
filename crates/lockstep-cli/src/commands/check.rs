//! Handler for `lockstep check`.

use miette::Result;

use lockstep_ops::ops_check;
use lockstep_ops::ops_setup::ProjectPaths;

pub fn exec(paths: &ProjectPaths) -> Result<()> {
    ops_check::check(paths)
}
