use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lockstep_util::errors::LockstepError;

/// Environment variable forcing frozen mode.
pub const FROZEN_ENV: &str = "LOCKSTEP_FROZEN";

/// How far a leveled update may move a locked version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateLevel {
    Major,
    Minor,
    Patch,
}

impl UpdateLevel {
    /// Number of leading segments a candidate must share with the locked
    /// version to stay in bound.
    pub fn fixed_segments(&self) -> usize {
        match self {
            UpdateLevel::Major => 0,
            UpdateLevel::Minor => 1,
            UpdateLevel::Patch => 2,
        }
    }
}

/// Version-selection settings from `[strategy]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub level: Option<UpdateLevel>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub minimal: bool,
}

/// Resolution settings loaded from `.lockstep/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Never re-resolve or write the lockfile; fail if it is out of date.
    #[serde(default)]
    pub frozen: bool,

    /// Never let a re-resolution move a locked package to an older version.
    #[serde(default, rename = "only-update-to-newer-versions")]
    pub only_update_to_newer_versions: bool,

    /// Copy lockfile sections this version does not understand.
    #[serde(default, rename = "preserve-unknown-sections")]
    pub preserve_unknown_sections: bool,

    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl ResolveConfig {
    /// Load `<project_root>/.lockstep/config.toml`, or defaults if it doesn't
    /// exist, then apply environment overrides.
    pub fn load(project_root: &Path) -> miette::Result<Self> {
        let path = Self::project_path(project_root);
        let mut config = if path.is_file() {
            let content = std::fs::read_to_string(&path).map_err(|e| LockstepError::Generic {
                message: format!("Failed to read {}: {e}", path.display()),
            })?;
            toml::from_str(&content).map_err(|e| LockstepError::Generic {
                message: format!("Failed to parse {}: {e}", path.display()),
            })?
        } else {
            Self::default()
        };
        config.apply_env(std::env::var(FROZEN_ENV).ok().as_deref());
        Ok(config)
    }

    /// Returns the path of the project config file.
    pub fn project_path(project_root: &Path) -> PathBuf {
        project_root.join(".lockstep").join("config.toml")
    }

    /// Apply the value of `LOCKSTEP_FROZEN`, if set.
    pub fn apply_env(&mut self, frozen: Option<&str>) {
        match frozen.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => self.frozen = true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no") => self.frozen = false,
            Some(v) => tracing::warn!("ignoring {FROZEN_ENV}={v}; expected true or false"),
            None => {}
        }
    }
}

/// What a resolution is allowed to move away from the lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unlock {
    /// Re-resolve everything from scratch.
    All,
    /// Unlock the named packages and every package locked from the named sources.
    Only {
        names: BTreeSet<String>,
        sources: BTreeSet<String>,
    },
}

impl Default for Unlock {
    fn default() -> Self {
        Unlock::Only {
            names: BTreeSet::new(),
            sources: BTreeSet::new(),
        }
    }
}

impl Unlock {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Unlock::Only {
            names: names.into_iter().map(Into::into).collect(),
            sources: BTreeSet::new(),
        }
    }

    pub fn with_sources<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Unlock::All => Unlock::All,
            Unlock::Only { names, mut sources } => {
                sources.extend(extra.into_iter().map(Into::into));
                Unlock::Only { names, sources }
            }
        }
    }

    /// Whether anything at all is unlocked.
    pub fn is_requested(&self) -> bool {
        match self {
            Unlock::All => true,
            Unlock::Only { names, sources } => !names.is_empty() || !sources.is_empty(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Unlock::All)
    }
}
