//! Command dispatch and handler modules.

mod check;
mod lock;
mod tree;
mod update;

use miette::Result;

use lockstep_ops::ops_setup::ProjectPaths;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    tracing::debug!(command = ?cli.command, "dispatching");
    let paths = ProjectPaths {
        manifest: cli.manifest_path,
        index: cli.index,
    };
    match cli.command {
        Command::Lock {
            frozen,
            preserve_unknown,
        } => lock::exec(&paths, frozen, preserve_unknown),
        Command::Update {
            names,
            sources,
            patch,
            minor,
            major,
            strict,
            minimal,
            conservative_floor,
            dry_run,
        } => update::exec(
            &paths,
            update::Args {
                names,
                sources,
                patch,
                minor,
                major,
                strict,
                minimal,
                conservative_floor,
                dry_run,
            },
        ),
        Command::Check => check::exec(&paths),
        Command::Tree {
            depth,
            why,
            platform,
        } => tree::exec(&paths, depth, why, platform.as_deref()),
    }
}
