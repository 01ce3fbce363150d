//! Shared utilities for lockstep.
//!
//! This crate provides cross-cutting concerns used by all other lockstep crates:
//! error types, filesystem helpers (including the atomic lockfile replace),
//! cryptographic hashing for content-addressed sources, and terminal status
//! output.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod progress;
