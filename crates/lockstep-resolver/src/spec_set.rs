//! The chosen set of concrete package builds.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use lockstep_core::dependency::Dependency;
use lockstep_core::lockfile::{LockState, LockedPackage};
use lockstep_core::package::PackageVersion;
use lockstep_core::platform::Platform;
use lockstep_core::version::ParseError;

type Key = (String, Platform);

/// A consistent set of package builds, at most one per `(name, platform)`.
///
/// Backed by a persistent map, so clones are cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionSet {
    members: im::OrdMap<Key, Arc<PackageVersion>>,
}

impl ResolutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later builds replace earlier ones with the same `(name, platform)`.
    pub fn from_specs(specs: impl IntoIterator<Item = Arc<PackageVersion>>) -> Self {
        let mut set = Self::new();
        for spec in specs {
            set.insert(spec);
        }
        set
    }

    /// The packages recorded in a lockfile.
    pub fn from_lock(lock: &LockState) -> Result<Self, ParseError> {
        Ok(Self::from_specs(
            lock.package_versions()?.into_iter().map(Arc::new),
        ))
    }

    pub fn insert(&mut self, spec: Arc<PackageVersion>) -> Option<Arc<PackageVersion>> {
        self.members
            .insert((spec.name.clone(), spec.platform.clone()), spec)
    }

    /// Whether some member of `name` can run on `platform`.
    pub fn contains(&self, name: &str, platform: &Platform) -> bool {
        self.best(name, platform).is_some()
    }

    /// Every build of `name`, ordered by platform.
    pub fn get(&self, name: &str) -> Vec<&Arc<PackageVersion>> {
        self.members
            .range((name.to_string(), Platform::Pure)..)
            .take_while(|((n, _), _)| n == name)
            .map(|(_, spec)| spec)
            .collect()
    }

    /// The member of `name` best suited to `platform`.
    pub fn best(&self, name: &str, platform: &Platform) -> Option<&Arc<PackageVersion>> {
        let mut best: Option<(&Arc<PackageVersion>, u8)> = None;
        for spec in self.get(name) {
            let rank = spec.platform.specificity(platform);
            if rank > 0 && best.map_or(true, |(_, current)| rank > current) {
                best = Some((spec, rank));
            }
        }
        best.map(|(spec, _)| spec)
    }

    /// Members not present, identically, in `other`.
    pub fn difference(&self, other: &ResolutionSet) -> ResolutionSet {
        let members = self
            .members
            .iter()
            .filter(|(key, spec)| !other.members.get(*key).is_some_and(|o| same_build(o, spec)))
            .map(|(key, spec)| (key.clone(), Arc::clone(spec)))
            .collect();
        ResolutionSet { members }
    }

    /// Members of both sets; `self` wins where both hold a `(name, platform)`.
    pub fn union(&self, other: &ResolutionSet) -> ResolutionSet {
        ResolutionSet {
            members: self
                .members
                .clone()
                .union_with(other.members.clone(), |mine, _| mine),
        }
    }

    /// Members of both sets; `other` wins where both hold a `(name, platform)`.
    pub fn merge(&self, other: &ResolutionSet) -> ResolutionSet {
        other.union(self)
    }

    /// Every member whose name is not in `names`.
    pub fn without(&self, names: &BTreeSet<String>) -> ResolutionSet {
        let members = self
            .members
            .iter()
            .filter(|((name, _), _)| !names.contains(name))
            .map(|(key, spec)| (key.clone(), Arc::clone(spec)))
            .collect();
        ResolutionSet { members }
    }

    /// The members reachable from `requirements` on `platforms`, skipping
    /// `skip` names. Requirements with no member are ignored.
    pub fn for_requirements(
        &self,
        requirements: &[Dependency],
        platforms: &[Platform],
        skip: &BTreeSet<String>,
    ) -> ResolutionSet {
        let mut queue: VecDeque<(Dependency, Platform)> = VecDeque::new();
        for dep in requirements.iter().filter(|d| d.is_runtime()) {
            for platform in platforms.iter().filter(|p| dep.applies_to(p)) {
                queue.push_back((dep.clone(), platform.clone()));
            }
        }

        let mut handled: BTreeSet<(String, Platform)> = BTreeSet::new();
        let mut closure = ResolutionSet::new();
        while let Some((dep, platform)) = queue.pop_front() {
            if skip.contains(&dep.name) || !handled.insert((dep.name.clone(), platform.clone())) {
                continue;
            }
            let Some(spec) = self.best(&dep.name, &platform) else {
                continue;
            };
            closure.insert(Arc::clone(spec));
            for child in spec.runtime_dependencies(&platform) {
                queue.push_back((child.clone(), platform.clone()));
            }
        }
        closure
    }

    /// The members needed to install `requested` on `platforms`. Requested
    /// dependencies with no member for some platform are appended to
    /// `missing` instead.
    pub fn materialize(
        &self,
        requested: &[Dependency],
        platforms: &[Platform],
        missing: &mut Vec<Dependency>,
    ) -> ResolutionSet {
        for dep in requested.iter().filter(|d| d.is_runtime()) {
            let absent = platforms
                .iter()
                .filter(|p| dep.applies_to(p))
                .any(|p| self.best(&dep.name, p).is_none());
            if absent && !missing.iter().any(|m| m.name == dep.name) {
                missing.push(dep.clone());
            }
        }
        self.for_requirements(requested, platforms, &BTreeSet::new())
    }

    /// Check that every member's runtime dependencies on `platforms` are
    /// present and satisfied. Returns one message per problem.
    pub fn validate(&self, platforms: &[Platform]) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        for platform in platforms {
            for spec in self.members.values() {
                let in_use = self
                    .best(&spec.name, platform)
                    .is_some_and(|best| Arc::ptr_eq(best, spec));
                if !in_use {
                    continue;
                }
                for dep in spec.runtime_dependencies(platform) {
                    match self.best(&dep.name, platform) {
                        Some(found) if dep.requirement.satisfied_by(&found.version) => {}
                        Some(found) => problems.push(format!(
                            "{spec} requires {dep} on {platform}, but {found} is locked"
                        )),
                        None => problems.push(format!(
                            "{spec} requires {dep} on {platform}, which is missing"
                        )),
                    }
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.members.keys().map(|(name, _)| name.clone()).collect()
    }

    /// Members in canonical order: by name, then platform.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PackageVersion>> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn to_locked_packages(&self) -> Vec<LockedPackage> {
        self.iter().map(|spec| LockedPackage::from(spec.as_ref())).collect()
    }
}

fn same_build(a: &PackageVersion, b: &PackageVersion) -> bool {
    a.name == b.name && a.version == b.version && a.platform == b.platform && a.source == b.source
}
