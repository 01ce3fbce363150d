//! Handler for `lockstep update`.

use miette::Result;

use lockstep_core::config::UpdateLevel;
use lockstep_ops::ops_setup::ProjectPaths;
use lockstep_ops::ops_update::{self, UpdateOptions};

/// Flags of `lockstep update`, as parsed.
pub struct Args {
    pub names: Vec<String>,
    pub sources: Vec<String>,
    pub patch: bool,
    pub minor: bool,
    pub major: bool,
    pub strict: bool,
    pub minimal: bool,
    pub conservative_floor: bool,
    pub dry_run: bool,
}

pub fn exec(paths: &ProjectPaths, args: Args) -> Result<()> {
    let level = if args.patch {
        Some(UpdateLevel::Patch)
    } else if args.minor {
        Some(UpdateLevel::Minor)
    } else if args.major {
        Some(UpdateLevel::Major)
    } else {
        None
    };
    let opts = UpdateOptions {
        names: args.names,
        sources: args.sources,
        level,
        strict: args.strict,
        minimal: args.minimal,
        conservative_floor: args.conservative_floor,
        dry_run: args.dry_run,
    };
    ops_update::update(paths, &opts)
}
