use std::fmt;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::requirement::Requirement;
use crate::source::Source;
use crate::version::ParseError;

/// Whether a dependency edge takes part in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    #[default]
    Runtime,
    Development,
}

impl DependencyKind {
    pub fn is_runtime(&self) -> bool {
        *self == DependencyKind::Runtime
    }
}

/// A dependency on a named package.
///
/// Used both for the project's declared dependencies (`[[dependency]]` in
/// `Lockstep.toml`) and for the edges a package version declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "Requirement::is_any")]
    pub requirement: Requirement,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Target platforms this dependency applies to; empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<Platform>,
    #[serde(default, skip_serializing_if = "DependencyKind::is_runtime")]
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new(name: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            name: name.into(),
            requirement,
            groups: Vec::new(),
            source: None,
            platforms: Vec::new(),
            kind: DependencyKind::Runtime,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn development(mut self) -> Self {
        self.kind = DependencyKind::Development;
        self
    }

    pub fn is_runtime(&self) -> bool {
        self.kind.is_runtime()
    }

    /// Whether this dependency applies when building for `target`.
    pub fn applies_to(&self, target: &Platform) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| p.matches(target))
    }

    /// Groups this dependency belongs to, `default` when none are declared.
    pub fn group_names(&self) -> Vec<&str> {
        if self.groups.is_empty() {
            vec!["default"]
        } else {
            self.groups.iter().map(String::as_str).collect()
        }
    }

    /// Parse the `name (requirement) [platform, ...]` form used for package
    /// edges in the lockfile. Both the requirement and the platform list are
    /// optional.
    pub fn parse_entry(text: &str) -> Result<Self, ParseError> {
        let mut rest = text.trim();
        let mut platforms = Vec::new();
        if let Some(open) = rest.rfind('[') {
            let list = rest[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| ParseError::new("dependency", text, "missing `]`"))?;
            for platform in list.split(',') {
                platforms.push(platform.parse::<Platform>()?);
            }
            rest = rest[..open].trim_end();
        }
        let (name, requirement) = match rest.split_once('(') {
            Some((name, inner)) => {
                let inner = inner
                    .strip_suffix(')')
                    .ok_or_else(|| ParseError::new("dependency", text, "missing `)`"))?;
                (name.trim(), Requirement::parse(inner)?)
            }
            None => (rest, Requirement::default()),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ParseError::new("dependency", text, "bad package name"));
        }
        Ok(Self::new(name, requirement).with_platforms(platforms))
    }

    /// Render the entry form; the requirement is omitted when it accepts any
    /// version and the platform list when it applies everywhere.
    pub fn to_entry(&self) -> String {
        let mut entry = self.name.clone();
        if !self.requirement.is_any() {
            entry.push_str(&format!(" ({})", self.requirement));
        }
        if !self.platforms.is_empty() {
            let platforms: Vec<String> = self.platforms.iter().map(|p| p.to_string()).collect();
            entry.push_str(&format!(" [{}]", platforms.join(", ")));
        }
        entry
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.requirement)
    }
}
