//! Operation: verify that `Lockstep.lock` satisfies `Lockstep.toml` without
//! resolving or writing anything.

use lockstep_core::{LOCKFILE, MANIFEST_FILE};
use lockstep_resolver::{Reconciler, ResolutionSet};
use lockstep_util::errors::LockstepError;

use crate::ops_setup::{self, ProjectPaths};

/// Fail when the lockfile is missing, out of date, or internally inconsistent.
pub fn check(paths: &ProjectPaths) -> miette::Result<()> {
    let project = ops_setup::preflight(paths)?;
    let Some(lock) = project.lock.as_ref() else {
        return Err(LockstepError::Lockfile {
            message: format!("{LOCKFILE} does not exist; run `lockstep lock` to create it"),
        }
        .into());
    };

    let changes = Reconciler::new(&project.manifest, Some(lock), &project.index, &project.config)
        .changes()?;
    if !changes.is_empty() {
        return Err(LockstepError::Lockfile {
            message: format!(
                "{LOCKFILE} is out of date with {MANIFEST_FILE}: {changes}; run `lockstep lock`"
            ),
        }
        .into());
    }

    let platforms = project.manifest.target_platforms();
    let locked = ResolutionSet::from_lock(lock)?;
    if let Err(problems) = locked.validate(&platforms) {
        return Err(LockstepError::Resolution {
            message: problems.join("\n"),
        }
        .into());
    }

    let declared: Vec<_> = project.manifest.runtime_dependencies().cloned().collect();
    let mut missing = Vec::new();
    locked.materialize(&declared, &platforms, &mut missing);
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|d| d.to_string()).collect();
        return Err(LockstepError::Resolution {
            message: format!("{LOCKFILE} has no package for {}", names.join(", ")),
        }
        .into());
    }

    lockstep_util::progress::status(
        "Checked",
        &format!("{} packages, {LOCKFILE} is up to date", locked.len()),
    );
    Ok(())
}
