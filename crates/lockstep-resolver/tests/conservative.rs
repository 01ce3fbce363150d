use std::sync::Arc;

use lockstep_core::config::UpdateLevel;
use lockstep_core::dependency::Dependency;
use lockstep_core::package::PackageVersion;
use lockstep_core::platform::Platform;
use lockstep_core::source::Source;
use lockstep_core::version::Version;
use lockstep_resolver::{Index, Request, ResolutionSet, Resolver, Strategy, VersionPromoter};

fn pkg(name: &str, version: &str, deps: &[&str]) -> PackageVersion {
    let mut spec = PackageVersion::new(
        name,
        Version::parse(version).unwrap(),
        Source::registry(["https://packages.example"]),
    );
    spec.dependencies = deps
        .iter()
        .map(|d| Dependency::parse_entry(d).unwrap())
        .collect();
    spec
}

fn set(specs: &[(&str, &str)]) -> ResolutionSet {
    ResolutionSet::from_specs(
        specs
            .iter()
            .map(|(name, version)| Arc::new(pkg(name, version, &[]))),
    )
}

fn index() -> Index {
    Index::from_specs([
        pkg("foo", "1.3.7", &["bar (~> 2.0)"]),
        pkg("foo", "1.3.8", &["bar (~> 2.0)"]),
        pkg("foo", "1.4.3", &["bar (~> 2.0)"]),
        pkg("foo", "1.4.4", &["bar (~> 2.0)"]),
        pkg("foo", "1.4.5", &["bar (~> 2.1)"]),
        pkg("foo", "1.5.0", &["bar (~> 2.1)"]),
        pkg("foo", "1.5.1", &["bar (~> 3.0)"]),
        pkg("bar", "2.0.3", &[]),
        pkg("bar", "2.0.4", &[]),
        pkg("bar", "2.0.5", &[]),
        pkg("bar", "2.1.0", &[]),
        pkg("bar", "2.1.1", &[]),
        pkg("bar", "3.0.0", &[]),
    ])
}

fn leveled(level: UpdateLevel, strict: bool, minimal: bool) -> Strategy {
    Strategy::Leveled {
        level,
        strict,
        minimal,
    }
}

fn resolve_foo(
    index: &Index,
    strategy: Strategy,
    locked: &ResolutionSet,
    baseline: ResolutionSet,
) -> Vec<String> {
    let promoter = VersionPromoter::new(strategy).with_locked(locked);
    let requests = Request::expand(&[Dependency::parse_entry("foo").unwrap()], &[Platform::Pure]);
    Resolver::new(index)
        .with_promoter(promoter)
        .with_baseline(baseline)
        .resolve(&requests)
        .unwrap()
        .iter()
        .map(|s| s.full_name())
        .collect()
}

#[test]
fn default_strategy_takes_newest() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(&index(), Strategy::Default, &locked, ResolutionSet::new());
    assert_eq!(resolved, ["bar-3.0.0", "foo-1.5.1"]);
}

#[test]
fn patch_moves_to_the_newest_patch() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Patch, false, false),
        &locked,
        ResolutionSet::new(),
    );
    assert_eq!(resolved, ["bar-2.1.1", "foo-1.4.5"]);
}

#[test]
fn patch_strict_keeps_every_package_in_bound() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Patch, true, false),
        &locked,
        ResolutionSet::new(),
    );
    assert_eq!(resolved, ["bar-2.0.5", "foo-1.4.4"]);
}

#[test]
fn patch_minimal_takes_the_next_patch() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Patch, false, true),
        &locked,
        ResolutionSet::new(),
    );
    assert_eq!(resolved, ["bar-2.0.4", "foo-1.4.4"]);
}

#[test]
fn minor_allows_dependencies_past_the_bound() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Minor, false, false),
        &locked,
        ResolutionSet::new(),
    );
    assert_eq!(resolved, ["bar-3.0.0", "foo-1.5.1"]);
}

#[test]
fn minor_strict_stays_within_the_major_line() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Minor, true, false),
        &locked,
        ResolutionSet::new(),
    );
    assert_eq!(resolved, ["bar-2.1.1", "foo-1.5.0"]);
}

#[test]
fn minor_strict_falls_back_when_nothing_fits() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let index = Index::from_specs([
        pkg("foo", "1.4.3", &["bar (~> 2.0)"]),
        pkg("foo", "1.5.0", &["bar (>= 3.0)"]),
        pkg("bar", "2.0.3", &[]),
        pkg("bar", "3.0.0", &[]),
    ]);
    let promoter = VersionPromoter::new(leveled(UpdateLevel::Minor, true, false)).with_locked(&locked);
    let requests = Request::expand(
        &[Dependency::parse_entry("foo (>= 1.5)").unwrap()],
        &[Platform::Pure],
    );
    let resolved: Vec<String> = Resolver::new(&index)
        .with_promoter(promoter)
        .resolve(&requests)
        .unwrap()
        .iter()
        .map(|s| s.full_name())
        .collect();
    assert_eq!(resolved, ["bar-3.0.0", "foo-1.5.0"]);
}

#[test]
fn pinned_dependency_keeps_its_version() {
    let locked = set(&[("foo", "1.3.7"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Patch, false, false),
        &locked,
        set(&[("bar", "2.0.3")]),
    );
    assert_eq!(resolved, ["bar-2.0.3", "foo-1.3.8"]);
}

#[test]
fn pinned_dependency_constrains_the_unlocked_parent() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let resolved = resolve_foo(
        &index(),
        leveled(UpdateLevel::Patch, false, false),
        &locked,
        set(&[("bar", "2.0.3")]),
    );
    assert_eq!(resolved, ["bar-2.0.3", "foo-1.4.4"]);
}

#[test]
fn bypassed_names_ignore_the_level() {
    let locked = set(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
    let promoter = VersionPromoter::new(leveled(UpdateLevel::Patch, true, false))
        .with_locked(&locked)
        .with_bypass(["foo".to_string(), "bar".to_string()]);
    let requests = Request::expand(&[Dependency::parse_entry("foo").unwrap()], &[Platform::Pure]);
    let resolved: Vec<String> = Resolver::new(&index())
        .with_promoter(promoter)
        .resolve(&requests)
        .unwrap()
        .iter()
        .map(|s| s.full_name())
        .collect();
    assert_eq!(resolved, ["bar-3.0.0", "foo-1.5.1"]);
}
