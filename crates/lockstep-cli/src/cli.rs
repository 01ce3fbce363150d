//! CLI argument definitions for lockstep.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lockstep",
    version,
    about = "Resolve declared dependencies into a reproducible lockfile",
    long_about = "lockstep resolves the dependencies declared in Lockstep.toml against an index \
                  snapshot and keeps Lockstep.lock stable: packages unrelated to a change stay \
                  at their locked versions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to Lockstep.toml [default: search upwards from the current directory]
    #[arg(long, global = true, value_name = "PATH")]
    pub manifest_path: Option<PathBuf>,

    /// Path to the index snapshot [default: Lockstep.index.toml next to the manifest]
    #[arg(long, global = true, value_name = "PATH")]
    pub index: Option<PathBuf>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring Lockstep.lock up to date with Lockstep.toml
    Lock {
        /// Fail instead of re-resolving when the lockfile is out of date
        #[arg(long)]
        frozen: bool,
        /// Keep lockfile sections this version does not understand
        #[arg(long)]
        preserve_unknown: bool,
    },

    /// Unlock packages and resolve them again
    #[command(group(ArgGroup::new("level").args(["patch", "minor", "major"])))]
    Update {
        /// Packages to update [default: all]
        names: Vec<String>,
        /// Update every package locked from this source
        #[arg(long = "source", value_name = "NAME")]
        sources: Vec<String>,
        /// Prefer the newest patch release of each locked package
        #[arg(long)]
        patch: bool,
        /// Prefer the newest minor release of each locked package
        #[arg(long)]
        minor: bool,
        /// Allow any newer release
        #[arg(long)]
        major: bool,
        /// Never leave the chosen level, unless nothing resolves
        #[arg(long)]
        strict: bool,
        /// Prefer the smallest newer version instead of the largest
        #[arg(long)]
        minimal: bool,
        /// Never move a locked package to an older version
        #[arg(long)]
        conservative_floor: bool,
        /// Show what would change without writing the lockfile
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify that Lockstep.lock satisfies Lockstep.toml
    Check,

    /// Print the dependency tree
    Tree {
        /// Maximum depth
        #[arg(long)]
        depth: Option<usize>,
        /// Explain why a package is included
        #[arg(long, value_name = "NAME")]
        why: Option<String>,
        /// Platform to show [default: the first target platform]
        #[arg(long)]
        platform: Option<String>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
