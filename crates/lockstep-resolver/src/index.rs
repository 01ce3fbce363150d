//! The package catalog the resolver searches.
//!
//! An [`Index`] maps names to every known [`PackageVersion`], merged from an
//! ordered list of sources. Entries are grouped by version into
//! [`VersionGroup`]s, the unit the resolver activates.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use lockstep_core::dependency::Dependency;
use lockstep_core::package::PackageVersion;
use lockstep_core::platform::Platform;
use lockstep_core::requirement::Requirement;
use lockstep_core::source::Source;
use lockstep_core::version::Version;

/// All builds of one package at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGroup {
    name: String,
    version: Version,
    members: Vec<Arc<PackageVersion>>,
}

impl VersionGroup {
    /// Group builds that share a name and version, such as the locked builds
    /// of one package. Returns `None` for an empty or mixed list.
    pub fn from_members(members: Vec<Arc<PackageVersion>>) -> Option<Self> {
        let first = members.first()?;
        let (name, version) = (first.name.clone(), first.version.clone());
        if members.iter().any(|m| m.name != name || m.version != version) {
            return None;
        }
        Some(Self {
            name,
            version,
            members,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn members(&self) -> &[Arc<PackageVersion>] {
        &self.members
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    /// The best build for `target`: an exact platform match, then an alias
    /// match, then a pure build. Earlier sources win ties.
    pub fn for_platform(&self, target: &Platform) -> Option<&Arc<PackageVersion>> {
        let mut best: Option<(&Arc<PackageVersion>, u8)> = None;
        for member in &self.members {
            let rank = member.platform.specificity(target);
            if rank == 0 {
                continue;
            }
            if best.map_or(true, |(_, current)| rank > current) {
                best = Some((member, rank));
            }
        }
        best.map(|(member, _)| member)
    }

    pub fn supports(&self, target: &Platform) -> bool {
        self.for_platform(target).is_some()
    }

    /// Runtime dependencies of the build chosen for `target` that apply to it.
    pub fn dependencies_for(&self, target: &Platform) -> Vec<Dependency> {
        self.for_platform(target)
            .map(|member| member.runtime_dependencies(target).cloned().collect())
            .unwrap_or_default()
    }

    /// The concrete builds activated for `platforms`, one per distinct build.
    pub fn to_specs(&self, platforms: &[Platform]) -> Vec<Arc<PackageVersion>> {
        let mut specs: Vec<Arc<PackageVersion>> = Vec::new();
        for platform in platforms {
            if let Some(member) = self.for_platform(platform) {
                if !specs.iter().any(|s| s.platform == member.platform) {
                    specs.push(Arc::clone(member));
                }
            }
        }
        specs
    }
}

/// An entry dropped because an earlier source already provided the same
/// `(name, version, platform)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub kept: Arc<PackageVersion>,
    pub dropped: Arc<PackageVersion>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default, rename = "package")]
    packages: Vec<PackageVersion>,
}

/// Read-only catalog of available package versions.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Entries per name, sorted by version then platform.
    packages: BTreeMap<String, Vec<Arc<PackageVersion>>>,
    shadowed: Vec<Shadowed>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from one listing; the first occurrence of a build wins.
    pub fn from_specs(specs: impl IntoIterator<Item = PackageVersion>) -> Self {
        let mut index = Self::new();
        for spec in specs {
            index.add(Arc::new(spec));
        }
        index
    }

    /// Concatenate per-source indexes in precedence order.
    pub fn merge(sources: impl IntoIterator<Item = Index>) -> Self {
        let mut merged = Self::new();
        for index in sources {
            merged.shadowed.extend(index.shadowed);
            for entries in index.packages.into_values() {
                for entry in entries {
                    merged.add(entry);
                }
            }
        }
        merged
    }

    /// Parse a TOML snapshot of `[[package]]` tables, in file order.
    pub fn from_snapshot(content: &str) -> Result<Self, toml::de::Error> {
        let snapshot: Snapshot = toml::from_str(content)?;
        Ok(Self::from_specs(snapshot.packages))
    }

    /// Parse a snapshot and merge its entries by the precedence of
    /// `sources`. Entries no declared source serves come last.
    pub fn from_snapshot_ordered(
        content: &str,
        sources: &[Source],
    ) -> Result<Self, toml::de::Error> {
        let snapshot: Snapshot = toml::from_str(content)?;
        let mut buckets: Vec<Vec<PackageVersion>> = vec![Vec::new(); sources.len() + 1];
        for spec in snapshot.packages {
            let slot = sources
                .iter()
                .position(|s| s.serves(&spec.source))
                .unwrap_or(sources.len());
            buckets[slot].push(spec);
        }
        Ok(Self::merge(buckets.into_iter().map(Self::from_specs)))
    }

    /// Insert an entry unless the same build is already present. Returns
    /// whether it was added.
    pub fn add(&mut self, spec: Arc<PackageVersion>) -> bool {
        let entries = self.packages.entry(spec.name.clone()).or_default();
        if let Some(existing) = entries
            .iter()
            .find(|e| e.version == spec.version && e.platform == spec.platform)
        {
            tracing::debug!(
                "{} from {} is shadowed by {}",
                spec.full_name(),
                spec.source,
                existing.source
            );
            self.shadowed.push(Shadowed {
                kept: Arc::clone(existing),
                dropped: spec,
            });
            return false;
        }
        let key = sort_key(&spec);
        let at = entries.partition_point(|e| sort_key(e) <= key);
        entries.insert(at, spec);
        true
    }

    /// Version groups of `name` satisfying `requirement` with a build for
    /// `platform`, newest first.
    ///
    /// Pre-releases are only offered when the requirement names one, or when
    /// every known version of the package is a pre-release.
    pub fn search(
        &self,
        name: &str,
        requirement: &Requirement,
        platform: &Platform,
    ) -> Vec<Arc<VersionGroup>> {
        self.search_matching(name, requirement, platform, |_| true)
    }

    /// Like [`Index::search`], restricted to builds `source` serves.
    pub fn search_in(
        &self,
        name: &str,
        requirement: &Requirement,
        platform: &Platform,
        source: &Source,
    ) -> Vec<Arc<VersionGroup>> {
        self.search_matching(name, requirement, platform, |spec| {
            source.serves(&spec.source)
        })
    }

    fn search_matching(
        &self,
        name: &str,
        requirement: &Requirement,
        platform: &Platform,
        keep: impl Fn(&PackageVersion) -> bool,
    ) -> Vec<Arc<VersionGroup>> {
        let Some(entries) = self.packages.get(name) else {
            return Vec::new();
        };
        let allow_prerelease = requirement.is_prerelease()
            || entries.iter().all(|e| e.version.is_prerelease());

        let mut groups: Vec<VersionGroup> = Vec::new();
        for entry in entries {
            if !keep(entry) || !requirement.satisfied_by(&entry.version) {
                continue;
            }
            if entry.version.is_prerelease() && !allow_prerelease {
                continue;
            }
            match groups.last_mut() {
                Some(group) if group.version == entry.version => {
                    group.members.push(Arc::clone(entry));
                }
                _ => groups.push(VersionGroup {
                    name: name.to_string(),
                    version: entry.version.clone(),
                    members: vec![Arc::clone(entry)],
                }),
            }
        }

        groups
            .into_iter()
            .rev()
            .filter(|g| g.supports(platform))
            .map(Arc::new)
            .collect()
    }

    /// Every distinct version known for `name`, ascending.
    pub fn versions_of(&self, name: &str) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .packages
            .get(name)
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
            .unwrap_or_default();
        versions.dedup();
        versions
    }

    /// Like [`Index::versions_of`], restricted to builds `source` serves.
    pub fn versions_in(&self, name: &str, source: &Source) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .packages
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| source.serves(&e.source))
                    .map(|e| e.version.clone())
                    .collect()
            })
            .unwrap_or_default();
        versions.dedup();
        versions
    }

    /// Every build `source` serves, ordered by name, version and platform.
    pub fn specs_for_source(&self, source: &Source) -> Vec<Arc<PackageVersion>> {
        self.packages
            .values()
            .flatten()
            .filter(|e| source.serves(&e.source))
            .cloned()
            .collect()
    }

    /// The build with exactly this name, version and platform, if any.
    pub fn find(
        &self,
        name: &str,
        version: &Version,
        platform: &Platform,
    ) -> Option<&Arc<PackageVersion>> {
        self.packages
            .get(name)?
            .iter()
            .find(|e| e.version == *version && e.platform == *platform)
    }

    pub fn shadowed(&self) -> &[Shadowed] {
        &self.shadowed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_key(spec: &PackageVersion) -> (Version, String) {
    (spec.version.clone(), spec.platform.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, version: &str, platform: &str) -> PackageVersion {
        let mut spec = PackageVersion::new(
            name,
            Version::parse(version).unwrap(),
            Source::registry(["https://a"]),
        );
        spec.platform = platform.parse().unwrap();
        spec
    }

    fn linux() -> Platform {
        "x86_64-linux".parse().unwrap()
    }

    #[test]
    fn search_is_descending_and_grouped() {
        let index = Index::from_specs([
            spec("ffi", "1.0", "pure"),
            spec("ffi", "2.0", "pure"),
            spec("ffi", "2.0", "x86_64-linux"),
            spec("ffi", "1.5", "java"),
        ]);
        let groups = index.search("ffi", &Requirement::default(), &linux());
        let versions: Vec<String> = groups.iter().map(|g| g.version().to_string()).collect();
        assert_eq!(versions, ["2.0", "1.0"]);
        assert_eq!(groups[0].members().len(), 2);
        assert_eq!(
            groups[0].for_platform(&linux()).unwrap().platform,
            linux()
        );
    }

    #[test]
    fn prereleases_need_opt_in() {
        let index = Index::from_specs([spec("rack", "1.0", "pure"), spec("rack", "2.0.rc1", "pure")]);
        let any = index.search("rack", &Requirement::default(), &Platform::Pure);
        assert_eq!(any.len(), 1);
        let pre = index.search("rack", &Requirement::parse(">= 2.0.rc1").unwrap(), &Platform::Pure);
        assert_eq!(pre[0].version().to_string(), "2.0.rc1");

        let only_pre = Index::from_specs([spec("edge", "0.1.a", "pure")]);
        assert_eq!(only_pre.search("edge", &Requirement::default(), &Platform::Pure).len(), 1);
    }

    #[test]
    fn first_source_wins() {
        let mut mirror = spec("rack", "1.0", "pure");
        mirror.source = Source::registry(["https://b"]);
        let index = Index::merge([
            Index::from_specs([spec("rack", "1.0", "pure")]),
            Index::from_specs([mirror]),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.shadowed().len(), 1);
        assert_eq!(
            index.shadowed()[0].kept.source,
            Source::registry(["https://a"])
        );
    }

    #[test]
    fn to_specs_dedupes_builds() {
        let index = Index::from_specs([spec("json", "2.0", "pure"), spec("json", "2.0", "java")]);
        let group = &index.search("json", &Requirement::default(), &Platform::Pure)[0];
        let java: Platform = "java".parse().unwrap();
        let specs = group.to_specs(&[linux(), java.clone(), Platform::Pure]);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].platform, java);
    }

    #[test]
    fn snapshot_ordering_follows_sources() {
        let content = r#"
[[package]]
name = "rack"
version = "1.0"
source = "registry+https://b"

[[package]]
name = "rack"
version = "1.0"
source = "registry+https://a"
"#;
        let index = Index::from_snapshot_ordered(
            content,
            &[Source::registry(["https://a"]), Source::registry(["https://b"])],
        )
        .unwrap();
        let group = &index.search("rack", &Requirement::default(), &Platform::Pure)[0];
        assert_eq!(group.members()[0].source, Source::registry(["https://a"]));
    }
}
