//! Conflict-directed backjumping resolver.
//!
//! The search keeps a queue of open requirements and a map of activated
//! version groups. Each time a requirement names a package that is not
//! activated yet, a decision frame is pushed holding the ordered candidates
//! and a snapshot of the state before the decision. Snapshots are persistent
//! `im` structures, so pushing a frame is cheap.
//!
//! Every request and activation carries the set of decisions it depends on.
//! When a requirement contradicts an activation, the search does not simply
//! undo the last decision. It jumps to the newest frame among the decisions
//! behind either side, discarding every decision made since, and records the
//! remaining causes there. A frame that runs out of candidates hands its
//! causes back the same way, so a decision is only skipped when it played no
//! part in the failure.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use lockstep_core::dependency::Dependency;
use lockstep_core::platform::Platform;
use lockstep_core::requirement::Requirement;
use lockstep_core::source::Source;
use lockstep_core::version::Version;

use crate::cache::SearchCache;
use crate::conflict::{Conflict, ConflictReport, Existing, Link, ResolveError};
use crate::index::{Index, VersionGroup};
use crate::spec_set::ResolutionSet;
use crate::strategy::VersionPromoter;

/// An open requirement: a package wanted on one platform, with the chain of
/// requirements that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub name: String,
    pub requirement: Requirement,
    pub source: Option<Source>,
    pub platform: Platform,
    /// Empty for a declared dependency.
    pub required_by: im::Vector<Link>,
    /// Decisions this request depends on, by frame label.
    causes: im::OrdSet<String>,
}

impl Request {
    /// A declared dependency wanted on `platform`.
    pub fn root(dependency: &Dependency, platform: Platform) -> Self {
        Self {
            name: dependency.name.clone(),
            requirement: dependency.requirement.clone(),
            source: dependency.source.clone(),
            platform,
            required_by: im::Vector::new(),
            causes: im::OrdSet::new(),
        }
    }

    /// One request per runtime dependency and target platform it applies to.
    pub fn expand(dependencies: &[Dependency], platforms: &[Platform]) -> Vec<Request> {
        dependencies
            .iter()
            .filter(|d| d.is_runtime())
            .flat_map(|dep| {
                platforms
                    .iter()
                    .filter(move |p| dep.applies_to(p))
                    .map(move |p| Request::root(dep, p.clone()))
            })
            .collect()
    }

    pub fn is_root(&self) -> bool {
        self.required_by.is_empty()
    }

    fn child(
        dependency: &Dependency,
        platform: Platform,
        required_by: im::Vector<Link>,
        causes: im::OrdSet<String>,
    ) -> Self {
        Self {
            name: dependency.name.clone(),
            requirement: dependency.requirement.clone(),
            source: dependency.source.clone(),
            platform,
            required_by,
            causes,
        }
    }

    fn link(&self) -> Link {
        Link {
            name: self.name.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.requirement)
    }
}

/// A version group chosen for a package.
#[derive(Debug, Clone)]
struct Activation {
    group: Arc<VersionGroup>,
    /// Platforms whose dependency edges were queued, in activation order.
    platforms: im::Vector<Platform>,
    /// Chain ending in the request that activated the group.
    required_by: im::Vector<Link>,
    /// Decisions behind the activation, its own included.
    causes: im::OrdSet<String>,
}

#[derive(Debug, Clone, Default)]
struct State {
    queue: im::Vector<Request>,
    activated: im::OrdMap<String, Activation>,
}

/// A decision point: the candidates left for one request.
struct Frame {
    label: String,
    request: Request,
    candidates: VecDeque<Arc<VersionGroup>>,
    base: State,
    /// Decisions that took part in the failures of tried candidates.
    conflicts: BTreeSet<String>,
}

enum Signal {
    /// Continue the search from this state.
    Descend(State),
    /// Every requirement is satisfied.
    Solved(State),
    /// The current attempt failed because of these decisions; resume at the
    /// newest of them.
    Backjump(BTreeSet<String>),
}

/// Resolves requirements against an [`Index`].
///
/// Holds the inputs of a resolution; the search state lives only for the
/// duration of [`Resolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    index: &'a Index,
    overrides: BTreeMap<String, Source>,
    baseline: ResolutionSet,
    promoter: VersionPromoter,
    floors: BTreeMap<String, Requirement>,
    runtime: Option<Version>,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a Index) -> Self {
        Self {
            index,
            overrides: BTreeMap::new(),
            baseline: ResolutionSet::new(),
            promoter: VersionPromoter::default(),
            floors: BTreeMap::new(),
            runtime: None,
        }
    }

    /// Packages that must come from a specific source, by name.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Source>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Previously locked builds to keep: each name in the baseline only
    /// offers its locked version.
    pub fn with_baseline(mut self, baseline: ResolutionSet) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_promoter(mut self, promoter: VersionPromoter) -> Self {
        self.promoter = promoter;
        self
    }

    /// Extra requirements candidates must meet, without requiring the package.
    pub fn with_floors(mut self, floors: BTreeMap<String, Requirement>) -> Self {
        self.floors = floors;
        self
    }

    /// Host runtime version builds must support.
    pub fn with_runtime(mut self, runtime: Option<Version>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Find a consistent set of builds for `requests`.
    ///
    /// A strict strategy that finds no solution is retried once without
    /// `strict`, provided strict filtering removed some candidate on the way.
    pub fn resolve(&self, requests: &[Request]) -> Result<ResolutionSet, ResolveError> {
        let mut search = Search::new(self, &self.promoter);
        match search.run(requests) {
            Err(err) if search.pruned => {
                tracing::debug!("strict resolution failed, retrying without strict: {err}");
                let relaxed = self.promoter.relaxed();
                Search::new(self, &relaxed).run(requests)
            }
            result => result,
        }
    }

    fn source_for<'r>(&'r self, request: &'r Request) -> Option<&'r Source> {
        self.overrides
            .get(&request.name)
            .or(request.source.as_ref())
    }

    /// Ordered candidates for `request` under `promoter`, and whether strict
    /// filtering dropped any.
    fn search(
        &self,
        promoter: &VersionPromoter,
        request: &Request,
    ) -> (Vec<Arc<VersionGroup>>, bool) {
        let name = request.name.as_str();
        let mut groups = match self.source_for(request) {
            Some(source) => {
                self.index
                    .search_in(name, &request.requirement, &request.platform, source)
            }
            None => self
                .index
                .search(name, &request.requirement, &request.platform),
        };
        groups.retain(|group| {
            let floor_ok = self
                .floors
                .get(name)
                .map_or(true, |floor| floor.satisfied_by(group.version()));
            let runtime_ok = group
                .for_platform(&request.platform)
                .is_some_and(|member| member.supports_runtime(self.runtime.as_ref()));
            floor_ok && runtime_ok
        });

        let pinned = self.baseline.get(name);
        if let Some(first) = pinned.first() {
            let version = &first.version;
            if !request.requirement.satisfied_by(version) {
                tracing::trace!("{request} excludes locked {name}-{version}");
                return (Vec::new(), false);
            }
            if let Some(group) = groups.iter().find(|g| g.version() == version) {
                return (vec![Arc::clone(group)], false);
            }
            let members: Vec<_> = pinned.into_iter().cloned().collect();
            let kept = VersionGroup::from_members(members)
                .filter(|g| g.supports(&request.platform))
                .map(|g| vec![Arc::new(g)])
                .unwrap_or_default();
            return (kept, false);
        }

        let offered = groups.len();
        let sorted = promoter.sort(name, groups);
        let pruned = sorted.len() < offered;
        (sorted, pruned)
    }
}

/// Resolve `dependencies` for `platforms` with the default strategy and no lock.
pub fn resolve(
    index: &Index,
    dependencies: &[Dependency],
    platforms: &[Platform],
) -> Result<ResolutionSet, ResolveError> {
    Resolver::new(index).resolve(&Request::expand(dependencies, platforms))
}

/// The state of one resolution attempt.
struct Search<'r, 'a> {
    resolver: &'r Resolver<'a>,
    promoter: &'r VersionPromoter,
    cache: SearchCache,
    errors: BTreeMap<String, Conflict>,
    frames: Vec<Frame>,
    iterations: usize,
    /// Whether strict filtering removed a candidate during this search.
    pruned: bool,
}

impl<'r, 'a> Search<'r, 'a> {
    fn new(resolver: &'r Resolver<'a>, promoter: &'r VersionPromoter) -> Self {
        Self {
            resolver,
            promoter,
            cache: SearchCache::new(),
            errors: BTreeMap::new(),
            frames: Vec::new(),
            iterations: 0,
            pruned: false,
        }
    }

    fn run(&mut self, requests: &[Request]) -> Result<ResolutionSet, ResolveError> {
        tracing::debug!("resolving {} requirements", requests.len());
        let initial = State {
            queue: requests.iter().cloned().collect(),
            activated: im::OrdMap::new(),
        };
        let mut signal = Signal::Descend(initial);
        loop {
            signal = match signal {
                Signal::Descend(state) => self.descend(state)?,
                Signal::Solved(state) => {
                    tracing::debug!(
                        "resolved after {} iterations ({} searches cached, {} hits)",
                        self.iterations,
                        self.cache.len(),
                        self.cache.hits()
                    );
                    return Ok(finalize(&state));
                }
                Signal::Backjump(causes) => {
                    let Some(at) = self.frames.iter().rposition(|f| causes.contains(&f.label))
                    else {
                        return Err(self.failure());
                    };
                    self.frames.truncate(at + 1);
                    let frame = &mut self.frames[at];
                    tracing::trace!("jumping back to {}", frame.label);
                    let label = frame.label.clone();
                    frame.conflicts.extend(causes.into_iter().filter(|c| *c != label));
                    self.next_candidate()
                }
            };
        }
    }

    /// Work through the queue until a decision is needed or a conflict found.
    fn descend(&mut self, mut state: State) -> Result<Signal, ResolveError> {
        loop {
            self.iterations += 1;
            if state.queue.is_empty() {
                return Ok(Signal::Solved(state));
            }
            let mut queue = self.sorted_queue(&state);
            let Some(current) = queue.pop_front() else {
                return Ok(Signal::Solved(state));
            };
            state.queue = queue;

            if let Some(existing) = state.activated.get(&current.name).cloned() {
                if current.requirement.satisfied_by(existing.group.version()) {
                    self.errors.remove(&current.name);
                    if !existing.platforms.contains(&current.platform) {
                        let causes = existing.causes.clone().union(current.causes.clone());
                        for dep in existing.group.dependencies_for(&current.platform) {
                            state.queue.push_back(Request::child(
                                &dep,
                                current.platform.clone(),
                                existing.required_by.clone(),
                                causes.clone(),
                            ));
                        }
                        let mut widened = existing;
                        widened.platforms.push_back(current.platform.clone());
                        state.activated.insert(current.name.clone(), widened);
                    }
                    continue;
                }

                tracing::trace!(
                    "{current} conflicts with activated {}-{}",
                    current.name,
                    existing.group.version()
                );
                self.errors.insert(
                    current.name.clone(),
                    Conflict {
                        name: current.name.clone(),
                        existing: Some(Existing {
                            version: existing.group.version().clone(),
                            required_by: existing.required_by.iter().cloned().collect(),
                        }),
                        requirement: current.requirement.clone(),
                        required_by: current.required_by.iter().cloned().collect(),
                    },
                );
                let causes = current.causes.iter().chain(existing.causes.iter());
                return Ok(Signal::Backjump(causes.cloned().collect()));
            }

            let candidates = self.candidates(&current);
            if candidates.is_empty() {
                if current.is_root() {
                    return Err(self.not_found(&current));
                }
                tracing::trace!("no candidates for {current}");
                self.errors.insert(
                    current.name.clone(),
                    Conflict {
                        name: current.name.clone(),
                        existing: None,
                        requirement: current.requirement.clone(),
                        required_by: current.required_by.iter().cloned().collect(),
                    },
                );
                return Ok(Signal::Backjump(current.causes.iter().cloned().collect()));
            }

            self.frames.push(Frame {
                label: current.name.clone(),
                request: current,
                candidates: candidates.iter().cloned().collect(),
                base: state,
                conflicts: BTreeSet::new(),
            });
            return Ok(self.next_candidate());
        }
    }

    /// Try the newest frame's next candidate, or give up on the frame.
    fn next_candidate(&mut self) -> Signal {
        let Some(frame) = self.frames.last_mut() else {
            return Signal::Backjump(BTreeSet::new());
        };
        if let Some(group) = frame.candidates.pop_front() {
            return Signal::Descend(activate(&frame.base, &frame.request, group));
        }

        let Some(frame) = self.frames.pop() else {
            return Signal::Backjump(BTreeSet::new());
        };
        tracing::trace!("no candidate left for {}", frame.request);
        let mut causes = frame.conflicts;
        causes.extend(frame.request.causes.iter().cloned());
        causes.remove(&frame.label);
        Signal::Backjump(causes)
    }

    /// The queue ordered so the most constrained requests come first:
    /// activated names, pre-release requirements, names with a recorded
    /// conflict, then fewest candidates. Ties keep queue order.
    fn sorted_queue(&mut self, state: &State) -> im::Vector<Request> {
        let mut keyed: Vec<((bool, bool, bool, usize), Request)> =
            Vec::with_capacity(state.queue.len());
        for request in state.queue.iter() {
            let active = state.activated.contains_key(&request.name);
            let count = if active {
                0
            } else {
                self.candidates(request).len()
            };
            let key = (
                !active,
                !request.requirement.is_prerelease(),
                !self.errors.contains_key(&request.name),
                count,
            );
            keyed.push((key, request.clone()));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, request)| request).collect()
    }

    fn candidates(&mut self, request: &Request) -> Arc<[Arc<VersionGroup>]> {
        let resolver = self.resolver;
        let promoter = self.promoter;
        let pruned = &mut self.pruned;
        self.cache.get_or_insert_with(
            &request.name,
            &request.requirement,
            &request.platform,
            resolver.source_for(request),
            || {
                let (groups, cut) = resolver.search(promoter, request);
                *pruned |= cut;
                groups
            },
        )
    }

    fn not_found(&self, request: &Request) -> ResolveError {
        let index = self.resolver.index;
        let source = self.resolver.source_for(request);
        let available = match source {
            Some(source) => index.versions_in(&request.name, source),
            None => index.versions_of(&request.name),
        };
        ResolveError::NotFound {
            requirement: request.to_string(),
            source_name: source.map(|s| s.to_string()),
            available,
        }
    }

    fn failure(&self) -> ResolveError {
        let conflicts: Vec<Conflict> = self.errors.values().cloned().collect();
        let cycles: Vec<Vec<String>> = conflicts.iter().filter_map(Conflict::cycle).collect();
        if !conflicts.is_empty() && cycles.len() == conflicts.len() {
            let cycle = cycles
                .into_iter()
                .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
                .unwrap_or_default();
            return ResolveError::CyclicDependency { cycle };
        }
        ResolveError::VersionConflict(ConflictReport { conflicts })
    }
}

/// Activate `group` for `request` on top of `base`, queueing its edges.
fn activate(base: &State, request: &Request, group: Arc<VersionGroup>) -> State {
    tracing::trace!("trying {}-{} for {request}", group.name(), group.version());
    let mut state = base.clone();
    let mut required_by = request.required_by.clone();
    required_by.push_back(request.link());
    let causes = request.causes.update(request.name.clone());
    for dep in group.dependencies_for(&request.platform) {
        state.queue.push_back(Request::child(
            &dep,
            request.platform.clone(),
            required_by.clone(),
            causes.clone(),
        ));
    }
    state.activated.insert(
        request.name.clone(),
        Activation {
            group,
            platforms: im::vector![request.platform.clone()],
            required_by,
            causes,
        },
    );
    state
}

/// One build per distinct platform each activation was used on.
fn finalize(state: &State) -> ResolutionSet {
    let mut set = ResolutionSet::new();
    for activation in state.activated.values() {
        let platforms: Vec<Platform> = activation.platforms.iter().cloned().collect();
        for spec in activation.group.to_specs(&platforms) {
            set.insert(spec);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::config::UpdateLevel;
    use lockstep_core::package::PackageVersion;

    use crate::strategy::Strategy;

    fn pkg(name: &str, version: &str, deps: &[&str]) -> PackageVersion {
        let mut spec = PackageVersion::new(
            name,
            Version::parse(version).unwrap(),
            Source::registry(["https://a"]),
        );
        spec.dependencies = deps
            .iter()
            .map(|d| Dependency::parse_entry(d).unwrap())
            .collect();
        spec
    }

    fn strict_patch(locked: &[(&str, &str)]) -> VersionPromoter {
        let locked = ResolutionSet::from_specs(
            locked
                .iter()
                .map(|(name, version)| Arc::new(pkg(name, version, &[]))),
        );
        VersionPromoter::new(Strategy::Leveled {
            level: UpdateLevel::Patch,
            strict: true,
            minimal: false,
        })
        .with_locked(&locked)
    }

    fn requests(entries: &[&str]) -> Vec<Request> {
        let deps: Vec<Dependency> = entries
            .iter()
            .map(|d| Dependency::parse_entry(d).unwrap())
            .collect();
        Request::expand(&deps, &[Platform::Pure])
    }

    #[test]
    fn strict_failure_unrelated_to_filtering_is_not_retried() {
        let index = Index::from_specs([pkg("rack", "2.0.1", &[])]);
        let promoter = strict_patch(&[("rack", "2.0.0")]);
        let resolver = Resolver::new(&index).with_promoter(promoter.clone());

        let mut search = Search::new(&resolver, &promoter);
        let err = search.run(&requests(&["rack (>= 3)"])).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
        assert!(!search.pruned);
    }

    #[test]
    fn strict_filtering_is_recorded_and_relaxed() {
        let index = Index::from_specs([
            pkg("foo", "1.4.3", &["bar (~> 2.1)"]),
            pkg("bar", "2.0.3", &[]),
            pkg("bar", "2.1.0", &[]),
        ]);
        let promoter = strict_patch(&[("foo", "1.4.3"), ("bar", "2.0.3")]);
        let resolver = Resolver::new(&index).with_promoter(promoter.clone());

        let mut search = Search::new(&resolver, &promoter);
        assert!(search.run(&requests(&["foo"])).is_err());
        assert!(search.pruned);

        let set = resolver.resolve(&requests(&["foo"])).unwrap();
        let names: Vec<String> = set.iter().map(|s| s.full_name()).collect();
        assert_eq!(names, ["bar-2.1.0", "foo-1.4.3"]);
    }
}
