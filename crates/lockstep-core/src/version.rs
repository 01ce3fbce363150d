//! Package version parsing and ordering.
//!
//! Versions are dotted sequences of numeric and string segments:
//! - Segments are split on `.` and on digit/letter boundaries (`1.0.b2` is `1, 0, b, 2`)
//! - A `-` starts a pre-release tail and is read as `.pre.`
//! - Numeric segments compare as numbers, string segments lexically, and a
//!   string segment sorts below any numeric one
//! - Missing segments count as `0`, so `1.0` and `1.0.0` are the same version
//! - Any string segment makes the version a pre-release (`1.0.rc1` < `1.0`)

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use miette::Diagnostic;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Malformed version, requirement, platform or source text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("Malformed {what} `{text}`: {reason}")]
#[diagnostic(code(lockstep::parse))]
pub struct ParseError {
    pub what: &'static str,
    pub text: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(what: &'static str, text: &str, reason: impl Into<String>) -> Self {
        Self {
            what,
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// One component of a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Numeric(n) => write!(f, "{n}"),
            Segment::Text(s) => f.write_str(s),
        }
    }
}

const ZERO: Segment = Segment::Numeric(0);

/// A parsed package version with comparable segments.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    segments: Vec<Segment>,
    canonical: Vec<Segment>,
}

impl Version {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ParseError::new("version", text, "empty version"));
        }
        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ParseError::new("version", text, "must start with a digit"));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
        {
            return Err(ParseError::new(
                "version",
                text,
                format!("unexpected character `{bad}`"),
            ));
        }

        let normalized = trimmed.replacen('-', ".pre.", 1).replace('-', ".");
        let mut segments = Vec::new();
        for part in normalized.split('.') {
            if part.is_empty() {
                return Err(ParseError::new("version", text, "empty segment"));
            }
            split_runs(part, text, &mut segments)?;
        }

        let canonical = canonicalize(&segments);
        Ok(Self {
            original: trimmed.to_string(),
            segments,
            canonical,
        })
    }

    /// Build a release version from numeric components.
    pub fn from_parts(parts: &[u64]) -> Self {
        let segments: Vec<Segment> = parts.iter().map(|n| Segment::Numeric(*n)).collect();
        let original = parts
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        let canonical = canonicalize(&segments);
        Self {
            original,
            segments,
            canonical,
        }
    }

    /// The zero version, the floor of the default requirement.
    pub fn zero() -> Self {
        Self::from_parts(&[0])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Text(_)))
    }

    /// The release this version belongs to: everything from the first string
    /// segment onward is dropped (`1.2.rc.3` becomes `1.2`).
    pub fn release(&self) -> Self {
        if !self.is_prerelease() {
            return self.clone();
        }
        let parts: Vec<u64> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Numeric(n) => Some(*n),
                Segment::Text(_) => None,
            })
            .collect();
        Self::from_parts(&parts)
    }

    /// The exclusive upper bound used by `~>`: drop the pre-release tail and
    /// the last segment, then increment what is left (`2.0.3` bumps to `2.1`,
    /// `2.0` bumps to `3`).
    pub fn bump(&self) -> Self {
        let mut parts: Vec<u64> = self
            .release()
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Numeric(n) => Some(*n),
                Segment::Text(_) => None,
            })
            .collect();
        if parts.len() > 1 {
            parts.pop();
        }
        if let Some(last) = parts.last_mut() {
            *last = last.saturating_add(1);
        }
        Self::from_parts(&parts)
    }

    /// Whether the first `count` segments of both versions are equal, padding
    /// missing segments with zero.
    pub fn shares_prefix(&self, other: &Version, count: usize) -> bool {
        (0..count).all(|i| {
            self.segments.get(i).unwrap_or(&ZERO) == other.segments.get(i).unwrap_or(&ZERO)
        })
    }

    /// The first `count` segments, padded with zero (`1.4.3` truncated to 2
    /// is `1.4`).
    pub fn truncate(&self, count: usize) -> Self {
        let segments: Vec<Segment> = (0..count)
            .map(|i| self.segments.get(i).unwrap_or(&ZERO).clone())
            .collect();
        let original = segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".");
        let canonical = canonicalize(&segments);
        Self {
            original,
            segments,
            canonical,
        }
    }
}

fn split_runs(part: &str, text: &str, out: &mut Vec<Segment>) -> Result<(), ParseError> {
    let mut current = String::new();
    let mut digits = false;
    for ch in part.chars() {
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != digits {
            out.push(classify(&current, digits, text)?);
            current.clear();
        }
        digits = is_digit;
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(classify(&current, digits, text)?);
    }
    Ok(())
}

fn classify(token: &str, digits: bool, text: &str) -> Result<Segment, ParseError> {
    if digits {
        token
            .parse::<u64>()
            .map(Segment::Numeric)
            .map_err(|_| ParseError::new("version", text, format!("segment `{token}` is too large")))
    } else {
        Ok(Segment::Text(token.to_string()))
    }
}

/// Trailing zeros are dropped from the release part and from the
/// pre-release part independently, so `1.0.a.0` and `1.a` compare equal.
fn canonicalize(segments: &[Segment]) -> Vec<Segment> {
    let split = segments
        .iter()
        .position(|s| matches!(s, Segment::Text(_)))
        .unwrap_or(segments.len());
    let (release, pre) = segments.split_at(split);
    let mut out = trim_zeros(release);
    out.extend(trim_zeros(pre));
    out
}

fn trim_zeros(segments: &[Segment]) -> Vec<Segment> {
    let end = segments
        .iter()
        .rposition(|s| *s != ZERO)
        .map(|i| i + 1)
        .unwrap_or(0);
    segments[..end].to_vec()
}

fn compare_segments(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
        (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
        (Segment::Text(_), Segment::Numeric(_)) => Ordering::Less,
        (Segment::Numeric(_), Segment::Text(_)) => Ordering::Greater,
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.canonical.len().max(other.canonical.len());
        for i in 0..max_len {
            let a = self.canonical.get(i).unwrap_or(&ZERO);
            let b = other.canonical.get(i).unwrap_or(&ZERO);
            let ord = compare_segments(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}
