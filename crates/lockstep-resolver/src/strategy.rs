//! Version selection for packages that were already locked.
//!
//! By default the resolver tries the newest version first. A leveled strategy
//! instead keeps a locked package close to its locked version: candidates are
//! grouped into tiers and tried best tier first.
//!
//! 1. Newer versions that share the level's fixed leading segments with the
//!    locked version ("in bound").
//! 2. The locked version itself.
//! 3. Newer versions outside the bound, nearest release line first.
//! 4. Older versions.
//!
//! `patch` fixes two segments, `minor` one, `major` none. `strict` drops
//! tiers 3 and 4 (except under `major`); `minimal` tries newer versions
//! oldest first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lockstep_core::config::{StrategyConfig, UpdateLevel};
use lockstep_core::version::Version;

use crate::index::VersionGroup;
use crate::spec_set::ResolutionSet;

/// How candidates for a locked package are filtered and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Newest first, regardless of the lock.
    #[default]
    Default,
    Leveled {
        level: UpdateLevel,
        strict: bool,
        minimal: bool,
    },
}

impl Strategy {
    /// A modifier without a level implies `major`.
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config.level {
            Some(level) => Strategy::Leveled {
                level,
                strict: config.strict,
                minimal: config.minimal,
            },
            None if config.strict || config.minimal => Strategy::Leveled {
                level: UpdateLevel::Major,
                strict: config.strict,
                minimal: config.minimal,
            },
            None => Strategy::Default,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Strategy::Leveled { strict: true, .. })
    }

    /// The same strategy with `strict` turned off.
    pub fn relaxed(self) -> Self {
        match self {
            Strategy::Leveled { level, minimal, .. } => Strategy::Leveled {
                level,
                strict: false,
                minimal,
            },
            Strategy::Default => Strategy::Default,
        }
    }
}

/// Orders candidate versions according to a [`Strategy`] and the previous lock.
#[derive(Debug, Clone, Default)]
pub struct VersionPromoter {
    strategy: Strategy,
    locked: BTreeMap<String, Version>,
    bypass: BTreeSet<String>,
}

impl VersionPromoter {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Use the versions in `locked` as the reference point for leveling.
    pub fn with_locked(mut self, locked: &ResolutionSet) -> Self {
        for spec in locked.iter() {
            self.locked
                .entry(spec.name.clone())
                .or_insert_with(|| spec.version.clone());
        }
        self
    }

    /// Names that always get the full newest-first list.
    pub fn with_bypass(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.bypass.extend(names);
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn relaxed(&self) -> Self {
        Self {
            strategy: self.strategy.relaxed(),
            ..self.clone()
        }
    }

    pub fn locked_version(&self, name: &str) -> Option<&Version> {
        self.locked.get(name)
    }

    /// Filter and order `candidates`, which arrive newest first.
    pub fn sort(&self, name: &str, candidates: Vec<Arc<VersionGroup>>) -> Vec<Arc<VersionGroup>> {
        let Strategy::Leveled {
            level,
            strict,
            minimal,
        } = self.strategy
        else {
            return candidates;
        };
        if self.bypass.contains(name) {
            return candidates;
        }
        let Some(locked) = self.locked.get(name) else {
            return candidates;
        };

        let fixed = level.fixed_segments();
        let mut newer_in = Vec::new();
        let mut current = Vec::new();
        let mut newer_out = Vec::new();
        let mut older = Vec::new();
        for group in candidates {
            let version = group.version();
            if version == locked {
                current.push(group);
            } else if version < locked {
                older.push(group);
            } else if version.shares_prefix(locked, fixed) {
                newer_in.push(group);
            } else {
                newer_out.push(group);
            }
        }

        if strict && level != UpdateLevel::Major {
            newer_out.clear();
            older.clear();
        }
        if minimal {
            newer_in.reverse();
            newer_out.reverse();
        }
        newer_out.sort_by(|a, b| a.version().truncate(fixed).cmp(&b.version().truncate(fixed)));

        let ordered: Vec<Arc<VersionGroup>> = newer_in
            .into_iter()
            .chain(current)
            .chain(newer_out)
            .chain(older)
            .collect();
        tracing::trace!(
            "{name} (locked {locked}): {}",
            ordered
                .iter()
                .map(|g| g.version().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        ordered
    }
}
