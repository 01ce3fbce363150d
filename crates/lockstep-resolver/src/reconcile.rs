//! Reconciling declarations with the previous lockfile.
//!
//! The reconciler decides how much of the previous resolution still holds.
//! When nothing relevant changed the locked packages are reused without
//! running the resolver. Otherwise every locked package that is still valid
//! and reachable from unchanged declarations is pinned, and only the rest is
//! resolved again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use lockstep_core::config::{ResolveConfig, Unlock};
use lockstep_core::dependency::Dependency;
use lockstep_core::lockfile::{LockState, LockedDependency};
use lockstep_core::manifest::Manifest;
use lockstep_core::package::PackageVersion;
use lockstep_core::platform::Platform;
use lockstep_core::requirement::Requirement;
use lockstep_core::source::Source;
use lockstep_core::version::{ParseError, Version};
use lockstep_core::MANIFEST_FILE;

use crate::conflict::{ConflictReport, ResolveError};
use crate::index::Index;
use crate::resolver::{Request, Resolver};
use crate::spec_set::ResolutionSet;
use crate::strategy::{Strategy, VersionPromoter};

#[derive(Debug, Error, Diagnostic)]
pub enum ReconcileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    /// Declarations drifted from the lockfile while re-resolution is forbidden.
    #[error("{}", drift_message(.added, .deleted, .changed))]
    #[diagnostic(
        code(lockstep::frozen),
        help("Run `lockstep lock` without frozen mode and commit the updated lockfile")
    )]
    FrozenDrift {
        added: Vec<String>,
        deleted: Vec<String>,
        changed: Vec<String>,
    },
}

fn drift_message(added: &[String], deleted: &[String], changed: &[String]) -> String {
    let mut message =
        format!("The lockfile does not match {MANIFEST_FILE} and frozen mode is enabled.");
    for (title, items) in [
        ("You have added to", added),
        ("You have deleted from", deleted),
        ("You have changed in", changed),
    ] {
        if items.is_empty() {
            continue;
        }
        message.push_str(&format!("\n\n{title} {MANIFEST_FILE}:"));
        for item in items {
            message.push_str(&format!("\n* {item}"));
        }
    }
    message
}

/// Whether the previous lock was reused or a new one resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reused,
    Resolved,
}

/// Differences between the declarations and the previous lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub missing_lock: bool,
    pub added: Vec<Dependency>,
    pub deleted: Vec<Dependency>,
    /// Declarations present on both sides with a different requirement,
    /// source or platform list, as `(locked, current)`.
    pub changed: Vec<(Dependency, Dependency)>,
    pub sources_added: Vec<Source>,
    pub sources_deleted: Vec<Source>,
    pub platforms_added: Vec<Platform>,
    pub platforms_removed: Vec<Platform>,
    /// Local sources whose packages differ from the locked ones.
    pub local_sources: Vec<Source>,
    /// `(locked, current)` runtime versions, when they differ.
    pub runtime: Option<(Option<Version>, Option<Version>)>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        *self == Changes::default()
    }

    /// Names whose declaration was added, removed or changed.
    pub fn dependency_names(&self) -> BTreeSet<String> {
        self.added
            .iter()
            .chain(&self.deleted)
            .map(|d| d.name.clone())
            .chain(self.changed.iter().map(|(_, d)| d.name.clone()))
            .collect()
    }

    fn drift(&self) -> ReconcileError {
        let mut added: Vec<String> = self
            .sources_added
            .iter()
            .map(|s| format!("source: {s}"))
            .collect();
        added.extend(self.added.iter().map(Dependency::to_entry));
        added.extend(self.platforms_added.iter().map(|p| format!("platform: {p}")));

        let mut deleted: Vec<String> = self
            .sources_deleted
            .iter()
            .map(|s| format!("source: {s}"))
            .collect();
        deleted.extend(self.deleted.iter().map(Dependency::to_entry));
        deleted.extend(self.platforms_removed.iter().map(|p| format!("platform: {p}")));

        let mut changed: Vec<String> = self
            .changed
            .iter()
            .map(|(old, new)| format!("{} from `{}` to `{}`", new.name, old.to_entry(), new.to_entry()))
            .collect();
        changed.extend(
            self.local_sources
                .iter()
                .map(|s| format!("packages in {s} changed on disk")),
        );
        if let Some((old, new)) = &self.runtime {
            changed.push(format!(
                "runtime from `{}` to `{}`",
                display_or_none(old.as_ref()),
                display_or_none(new.as_ref())
            ));
        }
        if self.missing_lock {
            changed.push("the lockfile is missing".to_string());
        }
        ReconcileError::FrozenDrift {
            added,
            deleted,
            changed,
        }
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reasons = Vec::new();
        if self.missing_lock {
            reasons.push("there is no lockfile".to_string());
        }
        if !self.added.is_empty() || !self.deleted.is_empty() || !self.changed.is_empty() {
            reasons.push("the declared dependencies changed".to_string());
        }
        if !self.sources_added.is_empty() || !self.sources_deleted.is_empty() {
            reasons.push("the sources changed".to_string());
        }
        if !self.platforms_added.is_empty() || !self.platforms_removed.is_empty() {
            reasons.push("the target platforms changed".to_string());
        }
        if !self.local_sources.is_empty() {
            reasons.push("packages in local sources changed".to_string());
        }
        if self.runtime.is_some() {
            reasons.push("the runtime version changed".to_string());
        }
        if reasons.is_empty() {
            f.write_str("nothing changed")
        } else {
            f.write_str(&reasons.join(", "))
        }
    }
}

fn display_or_none(version: Option<&Version>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// The result of reconciling.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub outcome: Outcome,
    pub changes: Changes,
    pub resolution: ResolutionSet,
    /// The lock to persist.
    pub lock: LockState,
    /// Declared dependencies with no build for some target platform.
    pub missing: Vec<Dependency>,
}

/// Reconciles a [`Manifest`] with the previous [`LockState`].
pub struct Reconciler<'a> {
    manifest: &'a Manifest,
    locked: Option<&'a LockState>,
    index: &'a Index,
    config: &'a ResolveConfig,
    unlock: Unlock,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        manifest: &'a Manifest,
        locked: Option<&'a LockState>,
        index: &'a Index,
        config: &'a ResolveConfig,
    ) -> Self {
        Self {
            manifest,
            locked,
            index,
            config,
            unlock: Unlock::default(),
        }
    }

    pub fn with_unlock(mut self, unlock: Unlock) -> Self {
        self.unlock = unlock;
        self
    }

    /// Compare the declarations with the previous lock.
    pub fn changes(&self) -> Result<Changes, ReconcileError> {
        let Some(locked) = self.locked else {
            return Ok(Changes {
                missing_lock: true,
                ..Changes::default()
            });
        };
        let mut changes = Changes::default();

        let current: BTreeMap<&str, &Dependency> = self
            .manifest
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();
        let previous: BTreeMap<&str, Dependency> = locked
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.to_dependency()))
            .collect();
        for (name, dep) in &current {
            match previous.get(name) {
                None => changes.added.push((*dep).clone()),
                Some(old) if !same_declaration(old, dep) => {
                    changes.changed.push((old.clone(), (*dep).clone()))
                }
                Some(_) => {}
            }
        }
        for (name, old) in &previous {
            if !current.contains_key(name) {
                changes.deleted.push(old.clone());
            }
        }

        let sources = self.manifest.all_sources();
        changes.sources_added = sources
            .iter()
            .filter(|s| !locked.sources.iter().any(|l| same_source(s, l)))
            .cloned()
            .collect();
        changes.sources_deleted = locked
            .sources
            .iter()
            .filter(|l| !sources.iter().any(|s| same_source(s, l)))
            .cloned()
            .collect();

        let platforms = self.manifest.target_platforms();
        changes.platforms_added = platforms
            .iter()
            .filter(|p| !locked.platforms.contains(p))
            .cloned()
            .collect();
        changes.platforms_removed = locked
            .platforms
            .iter()
            .filter(|p| !platforms.contains(p))
            .cloned()
            .collect();

        let locked_specs = locked.package_versions()?;
        for source in sources.iter().filter(|s| s.is_local()) {
            if !locked.sources.iter().any(|l| same_source(source, l)) {
                continue;
            }
            if self.local_specs_changed(source, &locked_specs) {
                changes.local_sources.push(source.clone());
            }
        }

        if self.manifest.runtime != locked.runtime {
            changes.runtime = Some((locked.runtime.clone(), self.manifest.runtime.clone()));
        }
        Ok(changes)
    }

    /// Decide between reusing the lock and resolving, and build the lock
    /// to persist.
    pub fn reconcile(&self) -> Result<Reconciliation, ReconcileError> {
        let changes = self.changes()?;
        let platforms = self.manifest.target_platforms();
        let declared: Vec<Dependency> = self.manifest.runtime_dependencies().cloned().collect();
        let locked_set = match self.locked {
            Some(locked) => ResolutionSet::from_lock(locked)?,
            None => ResolutionSet::new(),
        };

        if self.config.frozen {
            if !changes.is_empty() {
                return Err(changes.drift());
            }
            if self.unlock.is_requested() {
                tracing::warn!("frozen mode is enabled; ignoring the requested unlock");
            }
            tracing::debug!("frozen: reusing the lockfile");
            return Ok(self.finish(Outcome::Reused, changes, locked_set, &declared, &platforms));
        }

        if changes.is_empty() && !self.unlock.is_requested() {
            tracing::debug!("reusing the lockfile: nothing changed");
            return Ok(self.finish(Outcome::Reused, changes, locked_set, &declared, &platforms));
        }
        if self.unlock.is_requested() {
            tracing::debug!("resolving: an unlock was requested; {changes}");
        } else {
            tracing::debug!("resolving: {changes}");
        }

        let (mut baseline, bypass) = self.baseline(&changes, &locked_set, &declared, &platforms);
        tracing::debug!(
            "keeping {} of {} locked packages",
            baseline.len(),
            locked_set.len()
        );

        let promoter = VersionPromoter::new(Strategy::from_config(&self.config.strategy))
            .with_locked(&locked_set)
            .with_bypass(bypass);
        let overrides: BTreeMap<String, Source> = declared
            .iter()
            .filter_map(|d| d.source.clone().map(|s| (d.name.clone(), s)))
            .collect();
        let mut floors = BTreeMap::new();
        if self.config.only_update_to_newer_versions {
            for spec in locked_set.iter() {
                floors
                    .entry(spec.name.clone())
                    .or_insert_with(|| Requirement::at_least(spec.version.clone()));
            }
        }

        // A conflict involving pinned packages unlocks them and retries. The
        // baseline shrinks on every round.
        let requests = Request::expand(&declared, &platforms);
        let output = loop {
            let attempt = Resolver::new(self.index)
                .with_overrides(overrides.clone())
                .with_baseline(baseline.clone())
                .with_promoter(promoter.clone())
                .with_floors(floors.clone())
                .with_runtime(self.manifest.runtime.clone())
                .resolve(&requests);
            match attempt {
                Err(ResolveError::VersionConflict(report)) => {
                    let relax: BTreeSet<String> = involved_names(&report)
                        .into_iter()
                        .filter(|name| !baseline.get(name).is_empty())
                        .collect();
                    if relax.is_empty() {
                        return Err(ResolveError::VersionConflict(report).into());
                    }
                    tracing::debug!(
                        "unlocking {} after a conflict with locked packages",
                        relax.iter().cloned().collect::<Vec<_>>().join(", ")
                    );
                    baseline = baseline.without(&relax);
                }
                other => break other?,
            }
        };

        let resolution = baseline
            .merge(&output)
            .for_requirements(&declared, &platforms, &BTreeSet::new());
        if let Err(problems) = resolution.validate(&platforms) {
            for problem in problems {
                tracing::warn!("inconsistent resolution: {problem}");
            }
        }
        Ok(self.finish(Outcome::Resolved, changes, resolution, &declared, &platforms))
    }

    /// The locked packages to pin, and the names that skip leveling.
    fn baseline(
        &self,
        changes: &Changes,
        locked_set: &ResolutionSet,
        declared: &[Dependency],
        platforms: &[Platform],
    ) -> (ResolutionSet, BTreeSet<String>) {
        let sources = self.manifest.all_sources();
        let mut bypass = BTreeSet::new();
        let (explicit, unlocked_sources) = match &self.unlock {
            Unlock::All => return (ResolutionSet::new(), bypass),
            Unlock::Only {
                names,
                sources: unlocked,
            } => (names, unlocked),
        };

        let requested: Vec<Dependency> = explicit
            .iter()
            .map(|name| Dependency::new(name.clone(), Requirement::default()))
            .collect();
        let mut skip: BTreeSet<String> = locked_set
            .for_requirements(&requested, platforms, &BTreeSet::new())
            .names();
        skip.extend(explicit.iter().cloned());

        let mut kept = ResolutionSet::new();
        for spec in locked_set.iter() {
            let source_gone = !sources.iter().any(|s| s.serves(&spec.source));
            let source_unlocked = unlocked_sources.contains(&spec.source.name())
                || unlocked_sources.contains(&spec.name);
            if source_gone || source_unlocked {
                tracing::trace!("{spec}: source {} changed or unlocked", spec.source);
                bypass.insert(spec.name.clone());
                continue;
            }
            if spec.source.is_local() && !self.matches_index(spec) {
                tracing::trace!("{spec}: changed in {}", spec.source);
                continue;
            }
            if changes.runtime.is_some() && !self.supports_runtime(spec) {
                tracing::trace!("{spec}: does not support the new runtime");
                continue;
            }
            kept.insert(spec.clone());
        }

        let mut roots = Vec::new();
        for dep in declared {
            if self.still_locked(dep, locked_set) {
                roots.push(dep.clone());
            } else {
                skip.insert(dep.name.clone());
            }
        }
        (kept.for_requirements(&roots, platforms, &skip), bypass)
    }

    /// Whether a declaration is unchanged in the lock, or still satisfied by
    /// the locked package.
    fn still_locked(&self, dep: &Dependency, locked_set: &ResolutionSet) -> bool {
        let unchanged = self.locked.is_some_and(|locked| {
            locked
                .dependencies
                .iter()
                .any(|l| l.name == dep.name && same_declaration(&l.to_dependency(), dep))
        });
        unchanged || locked_set.get(&dep.name).iter().any(|spec| spec.satisfies(dep))
    }

    fn matches_index(&self, spec: &PackageVersion) -> bool {
        self.index
            .find(&spec.name, &spec.version, &spec.platform)
            .is_some_and(|indexed| {
                indexed.source.serves(&spec.source)
                    && edge_entries(indexed) == edge_entries(spec)
            })
    }

    fn supports_runtime(&self, spec: &PackageVersion) -> bool {
        self.index
            .find(&spec.name, &spec.version, &spec.platform)
            .map_or(true, |indexed| {
                indexed.supports_runtime(self.manifest.runtime.as_ref())
            })
    }

    /// Whether some build locked from `source` is gone from the index or
    /// now declares different edges. Builds the source offers but the lock
    /// never used do not count.
    fn local_specs_changed(&self, source: &Source, locked_specs: &[PackageVersion]) -> bool {
        let indexed: BTreeSet<(String, Version, String, Vec<String>)> = self
            .index
            .specs_for_source(source)
            .iter()
            .map(|s| summary(s.as_ref()))
            .collect();
        locked_specs
            .iter()
            .filter(|s| source.serves(&s.source))
            .any(|s| !indexed.contains(&summary(s)))
    }

    fn finish(
        &self,
        outcome: Outcome,
        changes: Changes,
        resolution: ResolutionSet,
        declared: &[Dependency],
        platforms: &[Platform],
    ) -> Reconciliation {
        let mut missing = Vec::new();
        resolution.materialize(declared, platforms, &mut missing);
        for dep in &missing {
            tracing::warn!("no package satisfies {dep} on every target platform");
        }

        let lock = match (outcome, self.locked) {
            (Outcome::Reused, Some(locked)) if self.config.frozen => locked.clone(),
            _ => self.build_lock(&resolution, platforms),
        };
        Reconciliation {
            outcome,
            changes,
            resolution,
            lock,
            missing,
        }
    }

    fn build_lock(&self, resolution: &ResolutionSet, platforms: &[Platform]) -> LockState {
        let mut lock = LockState {
            runtime: self.manifest.runtime.clone(),
            platforms: platforms.to_vec(),
            sources: self.manifest.all_sources(),
            dependencies: self
                .manifest
                .dependencies
                .iter()
                .map(LockedDependency::from)
                .collect(),
            packages: resolution.to_locked_packages(),
            ..LockState::default()
        };
        lock.stamp_tool_version(self.locked.and_then(|l| l.tool_version.as_ref()));
        lock.canonicalize();
        lock
    }
}

/// Every package named in a conflict or in the chains that led to it.
fn involved_names(report: &ConflictReport) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for conflict in &report.conflicts {
        names.insert(conflict.name.clone());
        names.extend(conflict.required_by.iter().map(|l| l.name.clone()));
        if let Some(existing) = &conflict.existing {
            names.extend(existing.required_by.iter().map(|l| l.name.clone()));
        }
    }
    names
}

/// Declarations compare by requirement, platform list and equivalent source.
fn same_declaration(a: &Dependency, b: &Dependency) -> bool {
    let mut a_platforms = a.platforms.clone();
    let mut b_platforms = b.platforms.clone();
    a_platforms.sort();
    b_platforms.sort();
    a.requirement == b.requirement
        && a_platforms == b_platforms
        && match (&a.source, &b.source) {
            (None, None) => true,
            (Some(x), Some(y)) => same_source(x, y),
            _ => false,
        }
}

/// Sources are the same when equivalent, or equal once pins are cleared.
fn same_source(a: &Source, b: &Source) -> bool {
    a.equivalent(b) || a.unpinned() == b.unpinned()
}

fn edge_entries(spec: &PackageVersion) -> Vec<String> {
    let mut entries: Vec<String> = spec
        .dependencies
        .iter()
        .filter(|d| d.is_runtime())
        .map(Dependency::to_entry)
        .collect();
    entries.sort();
    entries.dedup();
    entries
}

fn summary(spec: &PackageVersion) -> (String, Version, String, Vec<String>) {
    (
        spec.name.clone(),
        spec.version.clone(),
        spec.platform.to_string(),
        edge_entries(spec),
    )
}
