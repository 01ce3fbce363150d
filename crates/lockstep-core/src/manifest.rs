use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dependency::Dependency;
use crate::platform::Platform;
use crate::source::Source;
use crate::version::Version;

/// The parsed representation of a `Lockstep.toml` file.
///
/// ```toml
/// sources = ["registry+https://packages.example"]
/// platforms = ["x86_64-linux"]
/// runtime = "3.2.1"
///
/// [[dependency]]
/// name = "rack"
/// requirement = "~> 2.2"
/// groups = ["default"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Sources in priority order; the first one wins when several carry the
    /// same package version.
    #[serde(default)]
    pub sources: Vec<Source>,

    #[serde(default)]
    pub platforms: Vec<Platform>,

    /// Host runtime version that package builds must support.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Version>,

    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<Dependency>,
}

impl Manifest {
    /// Load and parse a `Lockstep.toml` file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            lockstep_util::errors::LockstepError::Manifest {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        Self::from_str(&content)
    }

    /// Parse a `Lockstep.toml` from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> miette::Result<Self> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| {
            lockstep_util::errors::LockstepError::Manifest {
                message: format!("Failed to parse Lockstep.toml: {e}"),
            }
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> miette::Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for dep in &self.dependencies {
            if !seen.insert(dep.name.as_str()) {
                return Err(lockstep_util::errors::LockstepError::Manifest {
                    message: format!("dependency `{}` is declared more than once", dep.name),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Declared sources followed by any source a dependency pins that is not
    /// already listed.
    pub fn all_sources(&self) -> Vec<Source> {
        let mut sources = self.sources.clone();
        for source in self.dependencies.iter().filter_map(|d| d.source.as_ref()) {
            if !sources.iter().any(|s| s.equivalent(source)) {
                sources.push(source.clone());
            }
        }
        sources
    }

    /// Declared dependencies that take part in resolution.
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.is_runtime())
    }

    /// Declared target platforms, or the host platform when none are listed.
    pub fn target_platforms(&self) -> Vec<Platform> {
        if self.platforms.is_empty() {
            vec![Platform::current()]
        } else {
            self.platforms.clone()
        }
    }
}
