//! Dependency resolution engine for lockstep.
//!
//! - [`index`]: the catalog of available package versions
//! - [`resolver`]: conflict-directed backjumping search over that catalog
//! - [`strategy`]: conservative ordering of candidates for locked packages
//! - [`reconcile`]: deciding how much of the previous lockfile to keep
//!
//! Everything here is synchronous and works on in-memory data; the index and
//! the previous lock are handed in by the caller.

pub mod cache;
pub mod conflict;
pub mod graph;
pub mod index;
pub mod reconcile;
pub mod resolver;
pub mod spec_set;
pub mod strategy;

pub use conflict::ResolveError;
pub use index::{Index, VersionGroup};
pub use reconcile::{Outcome, ReconcileError, Reconciler, Reconciliation};
pub use resolver::{resolve, Request, Resolver};
pub use spec_set::ResolutionSet;
pub use strategy::{Strategy, VersionPromoter};
