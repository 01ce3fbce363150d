//! Handler for `lockstep tree`.

use miette::Result;

use lockstep_core::platform::Platform;
use lockstep_ops::ops_setup::ProjectPaths;
use lockstep_ops::ops_tree::{self, TreeOptions};

pub fn exec(
    paths: &ProjectPaths,
    depth: Option<usize>,
    why: Option<String>,
    platform: Option<&str>,
) -> Result<()> {
    let platform = platform
        .map(|p| p.parse::<Platform>())
        .transpose()
        .map_err(|e| lockstep_util::errors::LockstepError::Generic {
            message: format!("invalid --platform: {e}"),
        })?;
    let opts = TreeOptions {
        depth,
        why,
        platform,
    };
    ops_tree::tree(paths, &opts)
}
