//! Resolution failures and the conflict report.

use std::fmt;

use lockstep_core::requirement::Requirement;
use lockstep_core::version::Version;
use miette::Diagnostic;
use thiserror::Error;

/// One step of a provenance chain: the requirement that pulled a package in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub name: String,
    pub requirement: Requirement,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.requirement)
    }
}

/// The activation a conflicting requirement ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Existing {
    pub version: Version,
    /// Chain ending in the requirement that activated it.
    pub required_by: Vec<Link>,
}

/// A requirement that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub name: String,
    /// `None` when no version satisfied the requirement at all.
    pub existing: Option<Existing>,
    pub requirement: Requirement,
    /// Chain of requirements that led to this one; empty for a declared
    /// dependency.
    pub required_by: Vec<Link>,
}

impl Conflict {
    /// The part of the provenance chain from the last time this package
    /// was required, when the package requires itself.
    pub fn cycle(&self) -> Option<Vec<String>> {
        self.existing.as_ref()?;
        let start = self.required_by.iter().rposition(|l| l.name == self.name)?;
        Some(
            self.required_by[start..]
                .iter()
                .map(|l| l.name.clone())
                .collect(),
        )
    }
}

/// Every conflict recorded when a resolution gave up, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.conflicts.iter().map(|c| c.name.as_str()).collect()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "No version conflicts.");
        }
        write!(f, "Could not find compatible versions:")?;
        for conflict in &self.conflicts {
            write!(f, "\n{conflict}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = format!("{} ({})", self.name, self.requirement);
        match &self.existing {
            Some(existing) => {
                writeln!(f, "  Conflict on `{}`:", self.name)?;
                write!(f, "    * {}-{} activated", self.name, existing.version)?;
                match existing.required_by.first() {
                    Some(root) if existing.required_by.len() > 1 => {
                        writeln!(f, " by {root}")?
                    }
                    Some(_) => writeln!(f, " by Lockstep.toml")?,
                    None => writeln!(f, " from the lockfile")?,
                }
                write!(f, "    * {request} required")?;
                match self.required_by.first() {
                    Some(root) => write!(f, " by {root}")?,
                    None => write!(f, " in Lockstep.toml")?,
                }
            }
            None => {
                write!(f, "  {request} not found")?;
                if let Some(parent) = self.required_by.last() {
                    write!(f, ", required by {parent}")?;
                }
            }
        }
        if self.required_by.len() > 1 {
            let chain: Vec<String> = self.required_by.iter().map(|l| l.to_string()).collect();
            write!(f, "\n      via {}", chain.join(" -> "))?;
        }
        Ok(())
    }
}

/// Why a resolution failed.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    /// A declared dependency has no candidate at all.
    #[error("{}", not_found_message(.requirement, .source_name.as_deref(), .available))]
    #[diagnostic(
        code(lockstep::resolve::not_found),
        help("Check the spelling and the requirement, or refresh the index")
    )]
    NotFound {
        requirement: String,
        source_name: Option<String>,
        available: Vec<Version>,
    },

    /// Candidates exist but none satisfy every requirement together.
    #[error("{0}")]
    #[diagnostic(
        code(lockstep::resolve::conflict),
        help("Relax one of the conflicting requirements, or run `lockstep update` for the packages involved")
    )]
    VersionConflict(ConflictReport),

    /// A package requires itself through a chain that cannot be satisfied.
    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(lockstep::resolve::cycle),
        help("Remove one of the dependencies that close the cycle")
    )]
    CyclicDependency { cycle: Vec<String> },
}

impl ResolveError {
    /// Names of the packages the failure is about.
    pub fn names(&self) -> Vec<String> {
        match self {
            ResolveError::NotFound { requirement, .. } => requirement
                .split_whitespace()
                .next()
                .map(|name| vec![name.to_string()])
                .unwrap_or_default(),
            ResolveError::VersionConflict(report) => {
                report.names().into_iter().map(str::to_string).collect()
            }
            ResolveError::CyclicDependency { cycle } => cycle.clone(),
        }
    }
}

fn not_found_message(requirement: &str, source: Option<&str>, available: &[Version]) -> String {
    let place = source.unwrap_or("any of the sources");
    let mut message = format!("Could not find package `{requirement}` in {place}");
    let name = requirement.split_whitespace().next().unwrap_or(requirement);
    if available.is_empty() {
        message.push_str(&format!("\nNo versions of `{name}` are known"));
    } else {
        let versions: Vec<String> = available.iter().map(|v| v.to_string()).collect();
        message.push_str(&format!(
            "\nKnown versions of `{name}`: {}",
            versions.join(", ")
        ));
    }
    message
}
