//! File-level operations behind the `lockstep` commands.
//!
//! Each `ops_*` module loads the project through [`ops_setup::preflight`],
//! drives the resolver crate, and reports progress on stderr.

pub mod ops_check;
pub mod ops_lock;
pub mod ops_setup;
pub mod ops_tree;
pub mod ops_update;
