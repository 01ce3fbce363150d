use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all lockstep operations.
#[derive(Debug, Error, Diagnostic)]
pub enum LockstepError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed dependency declarations (e.g. Lockstep.toml).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your Lockstep.toml for syntax errors"))]
    Manifest { message: String },

    /// The lockfile could not be read, parsed or written.
    #[error("Lockfile error: {message}")]
    Lockfile { message: String },

    /// The index snapshot could not be loaded.
    #[error("Index error: {message}")]
    Index { message: String },

    /// Dependency resolution failed (version conflicts, missing deps, etc.).
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// The declarations drifted from the lockfile while re-resolution is forbidden.
    #[error("The lockfile is out of date and frozen mode is enabled:\n{message}")]
    #[diagnostic(help(
        "Run `lockstep lock` without --frozen and commit the updated Lockstep.lock"
    ))]
    Frozen { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type LockstepResult<T> = miette::Result<T>;
