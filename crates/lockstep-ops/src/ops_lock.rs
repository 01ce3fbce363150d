//! Operation: reconcile the declarations with `Lockstep.lock` and persist the result.

use lockstep_core::config::Unlock;
use lockstep_core::lockfile::{lockfiles_equal, unknown_sections, LockState};
use lockstep_core::LOCKFILE;
use lockstep_resolver::{Outcome, Reconciler, Reconciliation};
use lockstep_util::errors::LockstepError;

use crate::ops_setup::{self, Project, ProjectPaths};

/// Options for `lockstep lock`.
#[derive(Debug, Default)]
pub struct LockOptions {
    /// Fail instead of re-resolving when the lockfile is out of date.
    pub frozen: bool,
    /// Keep lockfile sections this version does not understand.
    pub preserve_unknown: bool,
}

/// Bring `Lockstep.lock` up to date with `Lockstep.toml`.
pub fn lock(paths: &ProjectPaths, opts: &LockOptions) -> miette::Result<()> {
    let mut project = ops_setup::preflight(paths)?;
    project.config.frozen |= opts.frozen;
    project.config.preserve_unknown_sections |= opts.preserve_unknown;

    let result = reconcile_and_write(&project, Unlock::default())?;
    match result.outcome {
        Outcome::Reused => lockstep_util::progress::status_info(
            "Locked",
            &format!("{} packages, nothing changed", result.resolution.len()),
        ),
        Outcome::Resolved => lockstep_util::progress::status(
            "Locked",
            &format!("{} packages", result.resolution.len()),
        ),
    }
    Ok(())
}

/// Run the reconciler and write the lockfile when its content changed.
///
/// Nothing is written in frozen mode.
pub fn reconcile_and_write(project: &Project, unlock: Unlock) -> miette::Result<Reconciliation> {
    let sp = lockstep_util::progress::spinner("Resolving dependencies...");
    let result = Reconciler::new(
        &project.manifest,
        project.lock.as_ref(),
        &project.index,
        &project.config,
    )
    .with_unlock(unlock)
    .reconcile();
    sp.finish_and_clear();
    let result = result?;

    for dep in &result.missing {
        lockstep_util::progress::status_warn(
            "Missing",
            &format!("no package satisfies {dep} on every target platform"),
        );
    }

    if project.config.frozen {
        tracing::debug!("frozen: not writing {LOCKFILE}");
        return Ok(result);
    }
    write_lock(project, &result.lock)?;
    Ok(result)
}

fn write_lock(project: &Project, lock: &LockState) -> miette::Result<()> {
    let preserve = project.config.preserve_unknown_sections;
    let rendered = match (&project.lock_text, preserve) {
        (Some(previous), true) => lock.to_string_preserving(previous)?,
        _ => lock.to_string_pretty().map_err(|e| LockstepError::Lockfile {
            message: format!("Failed to serialize lockfile: {e}"),
        })?,
    };

    if let Some(current) = &project.lock_text {
        if !preserve {
            let dropped = unknown_sections(current);
            if !dropped.is_empty() {
                lockstep_util::progress::status_warn(
                    "Dropping",
                    &format!("unknown lockfile sections: {}", dropped.join(", ")),
                );
            }
        }
        if lockfiles_equal(current, &rendered, preserve) {
            tracing::debug!("{LOCKFILE} is already up to date");
            return Ok(());
        }
    }

    let path = project.lockfile_path();
    lockstep_util::fs::write_atomic(&path, rendered.as_bytes()).map_err(LockstepError::Io)?;
    tracing::debug!("wrote {}", path.display());
    Ok(())
}
