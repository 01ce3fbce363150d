//! Per-resolution memo of candidate searches.
//!
//! The same `(name, requirement, platform, source)` query is asked many times
//! while the resolver reorders its queue and backjumps, so each answer is
//! computed once per call.

use std::collections::HashMap;
use std::sync::Arc;

use lockstep_core::platform::Platform;
use lockstep_core::requirement::Requirement;
use lockstep_core::source::Source;

use crate::index::VersionGroup;

type Query = (String, Requirement, Platform, Option<Source>);

/// Candidate lists already computed during one resolution.
#[derive(Debug, Default)]
pub struct SearchCache {
    entries: HashMap<Query, Arc<[Arc<VersionGroup>]>>,
    hits: usize,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached answer for the query, computing it with `search` on
    /// first use.
    pub fn get_or_insert_with(
        &mut self,
        name: &str,
        requirement: &Requirement,
        platform: &Platform,
        source: Option<&Source>,
        search: impl FnOnce() -> Vec<Arc<VersionGroup>>,
    ) -> Arc<[Arc<VersionGroup>]> {
        let key = (
            name.to_string(),
            requirement.clone(),
            platform.clone(),
            source.cloned(),
        );
        if let Some(found) = self.entries.get(&key) {
            self.hits += 1;
            return Arc::clone(found);
        }
        let answer: Arc<[Arc<VersionGroup>]> = search().into();
        self.entries.insert(key, Arc::clone(&answer));
        answer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}
