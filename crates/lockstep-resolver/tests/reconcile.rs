use lockstep_core::config::{ResolveConfig, StrategyConfig, Unlock, UpdateLevel};
use lockstep_core::dependency::Dependency;
use lockstep_core::lockfile::LockState;
use lockstep_core::manifest::Manifest;
use lockstep_core::package::PackageVersion;
use lockstep_core::platform::Platform;
use lockstep_core::requirement::Requirement;
use lockstep_core::source::Source;
use lockstep_core::version::Version;
use lockstep_resolver::{Index, Outcome, ReconcileError, Reconciler, Reconciliation, ResolveError};

fn registry() -> Source {
    Source::registry(["https://packages.example"])
}

fn pkg(name: &str, version: &str, deps: &[&str]) -> PackageVersion {
    let mut spec = PackageVersion::new(name, Version::parse(version).unwrap(), registry());
    spec.dependencies = deps
        .iter()
        .map(|d| Dependency::parse_entry(d).unwrap())
        .collect();
    spec
}

fn manifest(deps: &[&str]) -> Manifest {
    Manifest {
        sources: vec![registry()],
        platforms: vec!["x86_64-linux".parse().unwrap()],
        runtime: None,
        dependencies: deps
            .iter()
            .map(|d| Dependency::parse_entry(d).unwrap())
            .collect(),
    }
}

fn reconcile(
    manifest: &Manifest,
    locked: Option<&LockState>,
    index: &Index,
    config: &ResolveConfig,
    unlock: Unlock,
) -> Result<Reconciliation, ReconcileError> {
    Reconciler::new(manifest, locked, index, config)
        .with_unlock(unlock)
        .reconcile()
}

fn lock_for(manifest: &Manifest, index: &Index) -> LockState {
    reconcile(manifest, None, index, &ResolveConfig::default(), Unlock::default())
        .unwrap()
        .lock
}

fn versions(reconciliation: &Reconciliation) -> Vec<String> {
    reconciliation
        .resolution
        .iter()
        .map(|s| s.full_name())
        .collect()
}

#[test]
fn first_lock_resolves_everything() {
    let index = Index::from_specs([pkg("rails", "7.0", &["rack (>= 2)"]), pkg("rack", "2.2", &[])]);
    let manifest = manifest(&["rails"]);
    let result = reconcile(&manifest, None, &index, &ResolveConfig::default(), Unlock::default())
        .unwrap();

    assert_eq!(result.outcome, Outcome::Resolved);
    assert!(result.changes.missing_lock);
    assert_eq!(versions(&result), ["rack-2.2", "rails-7.0"]);
    assert_eq!(result.lock.dependencies[0].name, "rails");
    assert_eq!(result.lock.sources, [registry()]);
    assert!(result.lock.tool_version.is_some());
    assert!(result.missing.is_empty());
}

#[test]
fn unchanged_declarations_reuse_the_lock() {
    let index = Index::from_specs([pkg("rack", "2.0", &[])]);
    let manifest = manifest(&["rack"]);
    let lock = lock_for(&manifest, &index);

    let newer = Index::from_specs([pkg("rack", "2.0", &[]), pkg("rack", "2.2", &[])]);
    let result = reconcile(
        &manifest,
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(result.outcome, Outcome::Reused);
    assert!(result.changes.is_empty());
    assert_eq!(versions(&result), ["rack-2.0"]);
    assert_eq!(
        result.lock.to_string_pretty().unwrap(),
        lock.to_string_pretty().unwrap()
    );
}

#[test]
fn frozen_mode_rejects_drift() {
    let index = Index::from_specs([pkg("rack", "2.0", &[]), pkg("thor", "1.0", &[])]);
    let lock = lock_for(&manifest(&["rack"]), &index);
    let config = ResolveConfig {
        frozen: true,
        ..ResolveConfig::default()
    };

    let err = reconcile(
        &manifest(&["rack", "thor (~> 1.0)"]),
        Some(&lock),
        &index,
        &config,
        Unlock::default(),
    )
    .unwrap_err();
    let ReconcileError::FrozenDrift { added, deleted, .. } = &err else {
        panic!("expected drift, got {err:?}");
    };
    assert_eq!(added, &["thor (~> 1.0)"]);
    assert!(deleted.is_empty());
    let message = err.to_string();
    assert!(message.contains("frozen mode is enabled"));
    assert!(message.contains("You have added to Lockstep.toml:\n* thor (~> 1.0)"));
}

#[test]
fn frozen_mode_reuses_a_matching_lock() {
    let index = Index::from_specs([pkg("rack", "2.0", &[])]);
    let manifest = manifest(&["rack"]);
    let lock = lock_for(&manifest, &index);
    let config = ResolveConfig {
        frozen: true,
        ..ResolveConfig::default()
    };

    let result = reconcile(&manifest, Some(&lock), &index, &config, Unlock::All).unwrap();
    assert_eq!(result.outcome, Outcome::Reused);
    assert_eq!(result.lock, lock);
}

#[test]
fn frozen_mode_requires_a_lockfile() {
    let index = Index::from_specs([pkg("rack", "2.0", &[])]);
    let config = ResolveConfig {
        frozen: true,
        ..ResolveConfig::default()
    };
    let err = reconcile(&manifest(&["rack"]), None, &index, &config, Unlock::default())
        .unwrap_err();
    let ReconcileError::FrozenDrift { changed, .. } = err else {
        panic!("expected drift");
    };
    assert_eq!(changed, ["the lockfile is missing"]);
}

#[test]
fn added_dependency_keeps_existing_pins() {
    let index = Index::from_specs([pkg("rack", "2.0", &[])]);
    let lock = lock_for(&manifest(&["rack"]), &index);

    let newer = Index::from_specs([
        pkg("rack", "2.0", &[]),
        pkg("rack", "2.2", &[]),
        pkg("thor", "1.0", &["rack"]),
    ]);
    let result = reconcile(
        &manifest(&["rack", "thor"]),
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(result.outcome, Outcome::Resolved);
    assert_eq!(result.changes.added.len(), 1);
    assert_eq!(versions(&result), ["rack-2.0", "thor-1.0"]);
}

#[test]
fn removed_dependency_drops_its_packages() {
    let index = Index::from_specs([
        pkg("rails", "7.0", &["rack"]),
        pkg("rack", "2.0", &[]),
        pkg("thor", "1.0", &[]),
    ]);
    let lock = lock_for(&manifest(&["rails", "thor"]), &index);

    let result = reconcile(
        &manifest(&["thor"]),
        Some(&lock),
        &index,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(result.changes.deleted[0].name, "rails");
    assert_eq!(versions(&result), ["thor-1.0"]);
    assert_eq!(result.lock.packages.len(), 1);
}

#[test]
fn changed_requirement_moves_only_that_package() {
    let index = Index::from_specs([
        pkg("rack", "2.0", &[]),
        pkg("thor", "1.0", &[]),
    ]);
    let lock = lock_for(&manifest(&["rack", "thor"]), &index);

    let newer = Index::from_specs([
        pkg("rack", "2.0", &[]),
        pkg("rack", "3.0", &[]),
        pkg("thor", "1.0", &[]),
        pkg("thor", "1.1", &[]),
    ]);
    let result = reconcile(
        &manifest(&["rack (>= 3)", "thor"]),
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(result.changes.changed.len(), 1);
    assert_eq!(versions(&result), ["rack-3.0", "thor-1.0"]);
}

#[test]
fn conflicting_declaration_unlocks_pinned_parents() {
    let index = Index::from_specs([
        pkg("rails", "7.0.4", &["rack (~> 2.2)", "activesupport (= 7.0.4)"]),
        pkg("rails", "7.1.0", &["rack (>= 3.0)", "activesupport (= 7.1.0)"]),
        pkg("activesupport", "7.0.4", &[]),
        pkg("activesupport", "7.1.0", &[]),
        pkg("rack", "2.2.4", &[]),
        pkg("rack", "3.0.8", &[]),
    ]);
    let lock = lock_for(&manifest(&["rails"]), &index);
    assert_eq!(lock.packages.len(), 3);

    let result = reconcile(
        &manifest(&["rails", "rack (< 3)"]),
        Some(&lock),
        &index,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(
        versions(&result),
        ["activesupport-7.0.4", "rack-2.2.4", "rails-7.0.4"]
    );
}

fn rails_index(rails: &str, rack: &str) -> Index {
    let mut specs = vec![pkg("rails", "1.0", &["rack (>= 1)"]), pkg("rack", "1.0", &[])];
    if rails != "1.0" {
        specs.push(pkg("rails", rails, &["rack (>= 1)"]));
    }
    if rack != "1.0" {
        specs.push(pkg("rack", rack, &[]));
    }
    Index::from_specs(specs)
}

#[test]
fn unlocking_a_name_unlocks_its_dependencies() {
    let manifest = manifest(&["rails"]);
    let lock = lock_for(&manifest, &rails_index("1.0", "1.0"));
    let newer = rails_index("1.1", "1.1");

    let untouched = reconcile(
        &manifest,
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(untouched.outcome, Outcome::Reused);
    assert_eq!(versions(&untouched), ["rack-1.0", "rails-1.0"]);

    let rails = reconcile(
        &manifest,
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::names(["rails"]),
    )
    .unwrap();
    assert_eq!(rails.outcome, Outcome::Resolved);
    assert_eq!(versions(&rails), ["rack-1.1", "rails-1.1"]);

    let rack = reconcile(
        &manifest,
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::names(["rack"]),
    )
    .unwrap();
    assert_eq!(versions(&rack), ["rack-1.1", "rails-1.0"]);
}

#[test]
fn unlocking_everything_honours_the_update_level() {
    let manifest = manifest(&["rack"]);
    let lock = lock_for(&manifest, &Index::from_specs([pkg("rack", "2.0.0", &[])]));
    let newer = Index::from_specs([
        pkg("rack", "2.0.0", &[]),
        pkg("rack", "2.0.1", &[]),
        pkg("rack", "2.1.0", &[]),
    ]);

    let unleveled = reconcile(
        &manifest,
        Some(&lock),
        &newer,
        &ResolveConfig::default(),
        Unlock::All,
    )
    .unwrap();
    assert_eq!(versions(&unleveled), ["rack-2.1.0"]);

    let patch = ResolveConfig {
        strategy: StrategyConfig {
            level: Some(UpdateLevel::Patch),
            strict: false,
            minimal: false,
        },
        ..ResolveConfig::default()
    };
    let leveled = reconcile(&manifest, Some(&lock), &newer, &patch, Unlock::All).unwrap();
    assert_eq!(versions(&leveled), ["rack-2.0.1"]);
}

#[test]
fn newer_only_floors_block_downgrades() {
    let index = Index::from_specs([pkg("rack", "1.0", &[]), pkg("rack", "2.0", &[])]);
    let lock = lock_for(&manifest(&["rack"]), &index);
    let downgraded = manifest(&["rack (< 2)"]);

    let allowed = reconcile(
        &downgraded,
        Some(&lock),
        &index,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(versions(&allowed), ["rack-1.0"]);

    let config = ResolveConfig {
        only_update_to_newer_versions: true,
        ..ResolveConfig::default()
    };
    let err = reconcile(&downgraded, Some(&lock), &index, &config, Unlock::default()).unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Resolve(ResolveError::NotFound { .. })
    ));
}

#[test]
fn local_source_changes_are_picked_up() {
    let vendor = Source::path("vendor/widget");
    let mut widget = pkg("widget", "0.1.0", &[]);
    widget.source = vendor.clone();
    let mut manifest = manifest(&[]);
    manifest
        .dependencies
        .push(Dependency::new("widget", Requirement::default()).with_source(vendor.clone()));
    let lock = lock_for(&manifest, &Index::from_specs([widget.clone()]));
    assert!(lock.sources.contains(&vendor));

    let mut edited = widget.clone();
    edited.dependencies = vec![Dependency::parse_entry("rack (>= 2)").unwrap()];
    let index = Index::from_specs([edited, pkg("rack", "2.0", &[])]);

    let config = ResolveConfig::default();
    let reconciler = Reconciler::new(&manifest, Some(&lock), &index, &config);
    let changes = reconciler.changes().unwrap();
    assert_eq!(changes.local_sources, [vendor]);

    let result = reconciler.reconcile().unwrap();
    assert_eq!(result.outcome, Outcome::Resolved);
    assert_eq!(versions(&result), ["rack-2.0", "widget-0.1.0"]);
}

#[test]
fn unused_packages_in_a_local_source_do_not_invalidate_the_lock() {
    let monorepo = Source::git("https://host/monorepo.git", Some("main"));
    let mut widget = pkg("widget", "0.1.0", &[]);
    widget.source = monorepo.clone();
    let mut gadget = pkg("gadget", "0.1.0", &["rack (>= 2)"]);
    gadget.source = monorepo.clone();
    let index = Index::from_specs([widget, gadget, pkg("rack", "2.0", &[])]);

    let mut manifest = manifest(&[]);
    manifest
        .dependencies
        .push(Dependency::new("widget", Requirement::default()).with_source(monorepo.clone()));
    let lock = lock_for(&manifest, &index);
    assert_eq!(lock.packages.len(), 1);

    let config = ResolveConfig::default();
    let reconciler = Reconciler::new(&manifest, Some(&lock), &index, &config);
    assert!(reconciler.changes().unwrap().local_sources.is_empty());
    assert_eq!(reconciler.reconcile().unwrap().outcome, Outcome::Reused);

    let frozen = ResolveConfig {
        frozen: true,
        ..ResolveConfig::default()
    };
    let result = reconcile(&manifest, Some(&lock), &index, &frozen, Unlock::default()).unwrap();
    assert_eq!(result.lock, lock);
}

#[test]
fn local_source_dropping_a_locked_version_is_a_change() {
    let monorepo = Source::git("https://host/monorepo.git", Some("main"));
    let mut widget = pkg("widget", "0.1.0", &[]);
    widget.source = monorepo.clone();
    let mut manifest = manifest(&[]);
    manifest
        .dependencies
        .push(Dependency::new("widget", Requirement::default()).with_source(monorepo.clone()));
    let lock = lock_for(&manifest, &Index::from_specs([widget.clone()]));

    let mut bumped = widget;
    bumped.version = Version::parse("0.2.0").unwrap();
    let index = Index::from_specs([bumped]);
    let result = reconcile(&manifest, Some(&lock), &index, &ResolveConfig::default(), Unlock::default())
        .unwrap();
    assert_eq!(result.changes.local_sources, [monorepo]);
    assert_eq!(versions(&result), ["widget-0.2.0"]);
}

#[test]
fn unlocking_a_package_applies_the_patch_strict_bound() {
    let manifest = manifest(&["foo"]);
    let lock = lock_for(
        &manifest,
        &Index::from_specs([pkg("foo", "1.4.3", &["bar (~> 2.0)"]), pkg("bar", "2.0.3", &[])]),
    );
    let index = Index::from_specs([
        pkg("foo", "1.4.3", &["bar (~> 2.0)"]),
        pkg("foo", "1.4.4", &["bar (~> 2.0)"]),
        pkg("foo", "1.4.5", &["bar (~> 2.1)"]),
        pkg("bar", "2.0.3", &[]),
        pkg("bar", "2.0.4", &[]),
        pkg("bar", "2.0.5", &[]),
        pkg("bar", "2.1.0", &[]),
    ]);
    let config = ResolveConfig {
        strategy: StrategyConfig {
            level: Some(UpdateLevel::Patch),
            strict: true,
            minimal: false,
        },
        ..ResolveConfig::default()
    };

    let result = reconcile(
        &manifest,
        Some(&lock),
        &index,
        &config,
        Unlock::names(["foo".to_string()]),
    )
    .unwrap();
    assert_eq!(versions(&result), ["bar-2.0.5", "foo-1.4.4"]);
}

#[test]
fn runtime_change_drops_unsupported_builds() {
    let mut modern = pkg("foo", "2.0", &[]);
    modern.required_runtime = Some(Requirement::parse("~> 3.0").unwrap());
    let index = Index::from_specs([pkg("foo", "1.0", &[]), modern]);

    let mut manifest = manifest(&["foo"]);
    manifest.runtime = Some(Version::parse("3.1").unwrap());
    let lock = lock_for(&manifest, &index);
    assert_eq!(lock.packages[0].version.to_string(), "2.0");

    manifest.runtime = Some(Version::parse("2.7").unwrap());
    let result = reconcile(
        &manifest,
        Some(&lock),
        &index,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert!(result.changes.runtime.is_some());
    assert_eq!(versions(&result), ["foo-1.0"]);
    assert_eq!(result.lock.runtime, manifest.runtime);
}

#[test]
fn platform_changes_are_detected() {
    let index = Index::from_specs([pkg("rack", "2.0", &[])]);
    let manifest = manifest(&["rack"]);
    let lock = lock_for(&manifest, &index);

    let mut wider = manifest.clone();
    wider.platforms.push("arm64-darwin".parse().unwrap());
    let changes = Reconciler::new(&wider, Some(&lock), &index, &ResolveConfig::default())
        .changes()
        .unwrap();
    let darwin: Platform = "arm64-darwin".parse().unwrap();
    assert_eq!(changes.platforms_added, [darwin]);
    assert!(changes.to_string().contains("the target platforms changed"));
}

#[test]
fn reused_lock_reports_missing_packages() {
    let index = Index::from_specs([pkg("rack", "2.0", &[])]);
    let manifest = manifest(&["rack"]);
    let mut lock = lock_for(&manifest, &index);
    lock.packages.clear();

    let result = reconcile(
        &manifest,
        Some(&lock),
        &index,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(result.outcome, Outcome::Reused);
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].name, "rack");
}

#[test]
fn lock_round_trips_through_text() {
    let index = Index::from_specs([pkg("rails", "7.0", &["rack (>= 2)"]), pkg("rack", "2.2", &[])]);
    let manifest = manifest(&["rails"]);
    let lock = lock_for(&manifest, &index);
    let text = lock.to_string_pretty().unwrap();
    let parsed = LockState::from_str(&text).unwrap();

    let result = reconcile(
        &manifest,
        Some(&parsed),
        &index,
        &ResolveConfig::default(),
        Unlock::default(),
    )
    .unwrap();
    assert_eq!(result.outcome, Outcome::Reused);
    assert_eq!(result.lock.to_string_pretty().unwrap(), text);
}
