//! Operation: unlock packages and re-resolve them.

use std::collections::{BTreeMap, BTreeSet};

use lockstep_core::config::{Unlock, UpdateLevel};
use lockstep_core::version::Version;
use lockstep_util::errors::LockstepError;

use crate::ops_lock::reconcile_and_write;
use crate::ops_setup::{self, ProjectPaths};

/// Options for `lockstep update`.
#[derive(Debug, Default)]
pub struct UpdateOptions {
    /// Packages to unlock. Empty with no sources means everything.
    pub names: Vec<String>,
    /// Sources whose packages are unlocked, by name.
    pub sources: Vec<String>,
    pub level: Option<UpdateLevel>,
    pub strict: bool,
    pub minimal: bool,
    /// Never move a locked package to an older version.
    pub conservative_floor: bool,
    /// Show what would change without writing the lockfile.
    pub dry_run: bool,
}

/// Re-resolve the requested packages, keeping the rest of the lock.
pub fn update(paths: &ProjectPaths, opts: &UpdateOptions) -> miette::Result<()> {
    let mut project = ops_setup::preflight(paths)?;
    if project.config.frozen {
        return Err(LockstepError::Frozen {
            message: "packages cannot be updated while frozen mode is enabled".to_string(),
        }
        .into());
    }

    let strategy = &mut project.config.strategy;
    if opts.level.is_some() {
        strategy.level = opts.level;
    }
    strategy.strict |= opts.strict;
    strategy.minimal |= opts.minimal;
    project.config.only_update_to_newer_versions |= opts.conservative_floor;

    let previous: BTreeMap<String, Version> = match &project.lock {
        Some(lock) => lock
            .packages
            .iter()
            .map(|p| (p.name.clone(), p.version.clone()))
            .collect(),
        None => BTreeMap::new(),
    };
    for name in &opts.names {
        let declared = project.manifest.dependencies.iter().any(|d| &d.name == name);
        if !previous.contains_key(name) && !declared {
            return Err(LockstepError::Generic {
                message: format!("package `{name}` is not part of the lockfile"),
            }
            .into());
        }
    }

    let unlock = if opts.names.is_empty() && opts.sources.is_empty() {
        Unlock::All
    } else {
        Unlock::names(opts.names.iter().cloned()).with_sources(opts.sources.iter().cloned())
    };
    let result = if opts.dry_run {
        lockstep_resolver::Reconciler::new(
            &project.manifest,
            project.lock.as_ref(),
            &project.index,
            &project.config,
        )
        .with_unlock(unlock)
        .reconcile()?
    } else {
        reconcile_and_write(&project, unlock)?
    };

    let verb = if opts.dry_run { "Would update" } else { "Updating" };
    let mut moved = 0;
    let mut seen = BTreeSet::new();
    for spec in result.resolution.iter() {
        if !seen.insert(spec.name.as_str()) {
            continue;
        }
        match previous.get(&spec.name) {
            Some(old) if *old != spec.version => {
                lockstep_util::progress::status(
                    verb,
                    &format!("{} {old} -> {}", spec.name, spec.version),
                );
                moved += 1;
            }
            None => {
                lockstep_util::progress::status(
                    "Adding",
                    &format!("{} {}", spec.name, spec.version),
                );
                moved += 1;
            }
            Some(_) => {}
        }
    }
    for name in previous.keys() {
        if result.resolution.get(name).is_empty() {
            lockstep_util::progress::status("Removing", name);
            moved += 1;
        }
    }

    if moved == 0 {
        lockstep_util::progress::status_info(
            "Updated",
            "all packages already at the selected versions",
        );
    } else if !opts.dry_run {
        lockstep_util::progress::status("Updated", &format!("{moved} packages"));
    }
    Ok(())
}
