//! Version requirements: a conjunction of `(operator, version)` clauses.
//!
//! Supported operators:
//! - `=`, `!=`, `>`, `<`, `>=`, `<=`
//! - `~>` (pessimistic): `~> 2.0.3` means `>= 2.0.3, < 2.1` and `~> 2.0` means `>= 2.0, < 3`
//!
//! A bare version is an exact match. An empty requirement is `>= 0`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{ParseError, Version};

/// A single comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Pessimistic,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Pessimistic => "~>",
        }
    }

    fn matches(&self, candidate: &Version, bound: &Version) -> bool {
        match self {
            Op::Eq => candidate == bound,
            Op::Ne => candidate != bound,
            Op::Gt => candidate > bound,
            Op::Lt => candidate < bound,
            Op::Ge => candidate >= bound,
            Op::Le => candidate <= bound,
            Op::Pessimistic => candidate >= bound && candidate.release() < bound.bump(),
        }
    }
}

// Longest operators first so `>=` is not read as `>`.
const OPERATORS: [(&str, Op); 7] = [
    ("~>", Op::Pessimistic),
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("!=", Op::Ne),
    ("=", Op::Eq),
    (">", Op::Gt),
    ("<", Op::Lt),
];

/// One `(operator, version)` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Clause {
    pub op: Op,
    pub version: Version,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}

/// A requirement is satisfied only when every clause is satisfied.
///
/// Clauses are kept sorted and de-duplicated, so two requirements with the
/// same clauses in a different order compare and display identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    clauses: Vec<Clause>,
}

impl Requirement {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let mut clauses = Vec::new();
        for raw in trimmed.split(',') {
            clauses.push(parse_clause(raw.trim(), text)?);
        }
        Ok(Self::from_clauses(clauses))
    }

    pub fn from_clauses(mut clauses: Vec<Clause>) -> Self {
        if clauses.is_empty() {
            return Self::default();
        }
        clauses.sort_by_key(|c| c.to_string());
        clauses.dedup();
        Self { clauses }
    }

    /// `= version`
    pub fn exact(version: Version) -> Self {
        Self {
            clauses: vec![Clause {
                op: Op::Eq,
                version,
            }],
        }
    }

    /// `>= version`
    pub fn at_least(version: Version) -> Self {
        Self {
            clauses: vec![Clause {
                op: Op::Ge,
                version,
            }],
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.clauses
            .iter()
            .all(|c| c.op.matches(version, &c.version))
    }

    /// Whether the requirement opts in to pre-release candidates.
    pub fn is_prerelease(&self) -> bool {
        self.clauses.iter().any(|c| c.version.is_prerelease())
    }

    /// True for the `>= 0` requirement that accepts any release.
    pub fn is_any(&self) -> bool {
        *self == Self::default()
    }

    /// Whether this is a single `=` clause pinning one version.
    pub fn pinned_version(&self) -> Option<&Version> {
        match self.clauses.as_slice() {
            [Clause { op: Op::Eq, version }] => Some(version),
            _ => None,
        }
    }
}

fn parse_clause(raw: &str, text: &str) -> Result<Clause, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::new("requirement", text, "empty clause"));
    }
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|(token, op)| raw.strip_prefix(token).map(|rest| (*op, rest)))
        .unwrap_or((Op::Eq, raw));
    let version = Version::parse(rest.trim())
        .map_err(|e| ParseError::new("requirement", text, e.reason))?;
    Ok(Clause { op, version })
}

impl Default for Requirement {
    fn default() -> Self {
        Self::at_least(Version::zero())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(|c| c.to_string()).collect();
        f.write_str(&rendered.join(", "))
    }
}

impl FromStr for Requirement {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Requirement::parse(&text).map_err(serde::de::Error::custom)
    }
}
