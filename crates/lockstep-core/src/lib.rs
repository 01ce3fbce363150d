//! Core data types for lockstep.
//!
//! This crate defines the values the resolver works on: versions and
//! requirements, platforms, sources, dependencies and package versions, the
//! `Lockstep.toml` declarations, the `Lockstep.lock` model, and resolution
//! configuration.
//!
//! This crate performs no network I/O.

/// Default manifest file name.
pub const MANIFEST_FILE: &str = "Lockstep.toml";

/// Default lockfile name.
pub const LOCKFILE: &str = "Lockstep.lock";

/// Default index snapshot file name.
pub const INDEX_FILE: &str = "Lockstep.index.toml";

pub mod config;
pub mod dependency;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod platform;
pub mod requirement;
pub mod source;
pub mod version;
