use serde::{Deserialize, Serialize};
use std::path::Path;

use lockstep_util::errors::LockstepError;

use crate::dependency::Dependency;
use crate::package::PackageVersion;
use crate::platform::Platform;
use crate::requirement::Requirement;
use crate::source::Source;
use crate::version::{ParseError, Version};

/// Format version written to every lockfile.
pub const LOCKFILE_FORMAT: u32 = 1;

/// Version of the running tool, stamped into the lockfile.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level keys this version understands; anything else is an unknown section.
pub const KNOWN_SECTIONS: [&str; 7] = [
    "version",
    "lockstep",
    "runtime",
    "platforms",
    "sources",
    "dependency",
    "package",
];

/// Keys describing the environment that wrote the file rather than the resolution.
const ENVIRONMENT_SECTIONS: [&str; 2] = ["lockstep", "runtime"];

const HEADER: &str = "# This file is generated by lockstep. Do not edit it by hand.\n\n";

/// Persisted result of a resolution (`Lockstep.lock`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    pub version: u32,

    /// Newest tool version that wrote this lockfile.
    #[serde(rename = "lockstep", default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<semver::Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Version>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<Platform>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    #[serde(default, rename = "dependency", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<LockedDependency>,

    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<LockedPackage>,
}

/// A declared dependency as recorded in the lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockedDependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "Requirement::is_any")]
    pub requirement: Requirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<Platform>,
}

/// A resolved package build with its dependency edges in `name (requirement)` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Platform::is_pure")]
    pub platform: Platform,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl From<&Dependency> for LockedDependency {
    fn from(dep: &Dependency) -> Self {
        let mut platforms = dep.platforms.clone();
        platforms.sort_by_key(|p| p.to_string());
        platforms.dedup();
        Self {
            name: dep.name.clone(),
            requirement: dep.requirement.clone(),
            source: dep.source.clone(),
            platforms,
        }
    }
}

impl LockedDependency {
    pub fn to_dependency(&self) -> Dependency {
        let mut dep = Dependency::new(self.name.clone(), self.requirement.clone())
            .with_platforms(self.platforms.clone());
        dep.source = self.source.clone();
        dep
    }
}

impl From<&PackageVersion> for LockedPackage {
    fn from(spec: &PackageVersion) -> Self {
        let mut dependencies: Vec<String> = spec
            .dependencies
            .iter()
            .filter(|d| d.is_runtime())
            .map(Dependency::to_entry)
            .collect();
        dependencies.sort();
        dependencies.dedup();
        Self {
            name: spec.name.clone(),
            version: spec.version.clone(),
            platform: spec.platform.clone(),
            source: spec.source.clone(),
            dependencies,
        }
    }
}

impl LockedPackage {
    pub fn to_package_version(&self) -> Result<PackageVersion, ParseError> {
        let dependencies = self
            .dependencies
            .iter()
            .map(|entry| Dependency::parse_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PackageVersion {
            name: self.name.clone(),
            version: self.version.clone(),
            platform: self.platform.clone(),
            source: self.source.clone(),
            dependencies,
            required_runtime: None,
        })
    }
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            version: LOCKFILE_FORMAT,
            tool_version: None,
            runtime: None,
            platforms: Vec::new(),
            sources: Vec::new(),
            dependencies: Vec::new(),
            packages: Vec::new(),
        }
    }
}

impl LockState {
    /// Load and parse a `Lockstep.lock` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LockstepError::Lockfile {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_str(&content)
    }

    /// Parse a lockfile from a string. Unknown top-level sections are ignored.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> miette::Result<Self> {
        let state: LockState = toml::from_str(content).map_err(|e| LockstepError::Lockfile {
            message: format!("Failed to parse lockfile: {e}"),
        })?;
        if state.version > LOCKFILE_FORMAT {
            return Err(LockstepError::Lockfile {
                message: format!(
                    "lockfile format {} is newer than the supported format {LOCKFILE_FORMAT}",
                    state.version
                ),
            }
            .into());
        }
        Ok(state)
    }

    /// Resolved packages as package versions.
    pub fn package_versions(&self) -> Result<Vec<PackageVersion>, ParseError> {
        self.packages
            .iter()
            .map(LockedPackage::to_package_version)
            .collect()
    }

    pub fn locked_version(&self, name: &str) -> Option<&Version> {
        self.packages
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.version)
    }

    /// Sort everything into the canonical order: packages by name then
    /// platform, platforms and sources by their string form, declarations by
    /// name with duplicates dropped.
    pub fn canonicalize(&mut self) {
        self.packages.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.platform.to_string().cmp(&b.platform.to_string()))
                .then_with(|| a.version.cmp(&b.version))
        });
        self.packages
            .dedup_by(|a, b| a.name == b.name && a.platform == b.platform);

        self.platforms.sort_by_key(|p| p.to_string());
        self.platforms.dedup();

        self.sources.sort_by_key(|s| s.to_string());
        self.sources.dedup();

        self.dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        self.dependencies.dedup_by(|a, b| a.name == b.name);
    }

    /// Stamp the newer of the previously recorded and the running tool
    /// version.
    pub fn stamp_tool_version(&mut self, locked: Option<&semver::Version>) {
        let Ok(current) = semver::Version::parse(TOOL_VERSION) else {
            return;
        };
        let stamp = match locked {
            Some(locked) if *locked > current => {
                tracing::warn!(
                    "the lockfile was written by lockstep {locked}, newer than the running {current}"
                );
                locked.clone()
            }
            Some(locked) => {
                if locked.major < current.major {
                    tracing::warn!(
                        "upgrading the lockfile from lockstep {locked} to {current}; older releases may not read it"
                    );
                }
                current
            }
            None => current,
        };
        self.tool_version = Some(stamp);
    }

    /// Serialize to TOML in canonical order.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        let mut canonical = self.clone();
        canonical.canonicalize();
        let body = toml::to_string_pretty(&canonical)?;
        Ok(format!("{HEADER}{body}"))
    }

    /// Serialize, copying every top-level section of `previous` this version
    /// does not understand.
    pub fn to_string_preserving(&self, previous: &str) -> miette::Result<String> {
        let rendered = self.to_string_pretty().map_err(|e| LockstepError::Lockfile {
            message: format!("Failed to serialize lockfile: {e}"),
        })?;
        let Ok(old) = previous.parse::<toml_edit::DocumentMut>() else {
            tracing::warn!("previous lockfile is not valid TOML; unknown sections are dropped");
            return Ok(rendered);
        };
        let mut doc = rendered
            .parse::<toml_edit::DocumentMut>()
            .map_err(|e| LockstepError::Lockfile {
                message: format!("Failed to re-read rendered lockfile: {e}"),
            })?;

        let mut trailing = String::new();
        for (key, item) in old.iter() {
            if KNOWN_SECTIONS.contains(&key) {
                continue;
            }
            tracing::debug!("preserving unknown lockfile section `{key}`");
            if item.is_value() {
                doc.insert(key, item.clone());
            } else {
                let mut section = toml_edit::DocumentMut::new();
                section.insert(key, item.clone());
                trailing.push('\n');
                trailing.push_str(section.to_string().trim_start_matches('\n'));
            }
        }
        Ok(format!("{doc}{trailing}"))
    }
}

/// Top-level keys in `content` this version does not understand.
pub fn unknown_sections(content: &str) -> Vec<String> {
    content
        .parse::<toml_edit::DocumentMut>()
        .map(|doc| {
            doc.iter()
                .map(|(key, _)| key.to_string())
                .filter(|key| !KNOWN_SECTIONS.contains(&key.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

/// Whether writing `proposed` over `current` would change anything.
///
/// When unknown sections are preserved, they are ignored along with the
/// environment stamps.
pub fn lockfiles_equal(current: &str, proposed: &str, preserve_unknown_sections: bool) -> bool {
    if !preserve_unknown_sections {
        return current == proposed;
    }
    let strip = |content: &str| -> Option<String> {
        let mut doc = content.parse::<toml_edit::DocumentMut>().ok()?;
        let ignored: Vec<String> = doc
            .iter()
            .map(|(key, _)| key.to_string())
            .filter(|key| {
                !KNOWN_SECTIONS.contains(&key.as_str())
                    || ENVIRONMENT_SECTIONS.contains(&key.as_str())
            })
            .collect();
        for key in ignored {
            doc.remove(&key);
        }
        Some(doc.to_string().trim().to_string())
    };
    match (strip(current), strip(proposed)) {
        (Some(a), Some(b)) => a == b,
        _ => current == proposed,
    }
}
