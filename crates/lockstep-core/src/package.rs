use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dependency::Dependency;
use crate::platform::Platform;
use crate::requirement::Requirement;
use crate::source::Source;
use crate::version::Version;

/// A package identity: a name within a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Package {
    pub name: String,
    pub source: Source,
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.name, self.source)
    }
}

/// One concrete, installable build of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Platform::is_pure")]
    pub platform: Platform,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    /// Host runtime versions this build supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_runtime: Option<Requirement>,
}

impl PackageVersion {
    pub fn new(name: impl Into<String>, version: Version, source: Source) -> Self {
        Self {
            name: name.into(),
            version,
            platform: Platform::Pure,
            source,
            dependencies: Vec::new(),
            required_runtime: None,
        }
    }

    pub fn package(&self) -> Package {
        Package {
            name: self.name.clone(),
            source: self.source.clone(),
        }
    }

    /// `name-version`, with `-platform` appended for specific builds.
    pub fn full_name(&self) -> String {
        if self.platform.is_pure() {
            format!("{}-{}", self.name, self.version)
        } else {
            format!("{}-{}-{}", self.name, self.version, self.platform)
        }
    }

    /// Runtime dependency edges that apply when building for `target`.
    pub fn runtime_dependencies<'a>(
        &'a self,
        target: &'a Platform,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies
            .iter()
            .filter(move |d| d.is_runtime() && d.applies_to(target))
    }

    /// Whether this build satisfies a dependency's name, requirement and source.
    pub fn satisfies(&self, dependency: &Dependency) -> bool {
        self.name == dependency.name
            && dependency.requirement.satisfied_by(&self.version)
            && dependency
                .source
                .as_ref()
                .map_or(true, |s| self.source.includes(s))
    }

    /// Whether this build can run on the given host runtime.
    pub fn supports_runtime(&self, runtime: Option<&Version>) -> bool {
        match (&self.required_runtime, runtime) {
            (Some(required), Some(runtime)) => required.satisfied_by(runtime),
            _ => true,
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
