//! Operation: display the dependency tree.

use lockstep_core::platform::Platform;
use lockstep_resolver::graph::DependencyGraph;
use lockstep_resolver::{Outcome, Reconciler};

use crate::ops_setup::{self, ProjectPaths};

/// Options for `lockstep tree`.
#[derive(Debug, Default)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Show why a package is included: its path from the root and everything
    /// that requires it.
    pub why: Option<String>,
    /// Platform to show; defaults to the first target platform.
    pub platform: Option<Platform>,
}

/// Print the resolved dependency tree. The lockfile is not written.
pub fn tree(paths: &ProjectPaths, opts: &TreeOptions) -> miette::Result<()> {
    let project = ops_setup::preflight(paths)?;
    let result = Reconciler::new(
        &project.manifest,
        project.lock.as_ref(),
        &project.index,
        &project.config,
    )
    .reconcile()?;
    if result.outcome == Outcome::Resolved {
        lockstep_util::progress::status_warn(
            "Note",
            "the lockfile is out of date; showing a fresh resolution",
        );
    }

    let platforms = project.manifest.target_platforms();
    let platform = match &opts.platform {
        Some(p) => p.clone(),
        None => platforms.first().cloned().unwrap_or_else(Platform::current),
    };
    let declared: Vec<_> = project.manifest.runtime_dependencies().cloned().collect();
    let graph =
        DependencyGraph::from_resolution(&project.name(), &result.resolution, &declared, &platform);

    if let Some(target) = &opts.why {
        let Some(path) = graph.find_path(target) else {
            println!("Package '{target}' is not in the tree for {platform}.");
            return Ok(());
        };
        println!("Path to {target}:");
        for (i, node) in path.iter().enumerate() {
            let indent = "  ".repeat(i);
            println!("{indent}{node}");
        }
        println!();
        print!("{}", graph.print_inverted_tree(target));
        return Ok(());
    }

    for cycle in graph.cycles() {
        tracing::debug!("dependency cycle: {}", cycle.join(" -> "));
    }
    print!("{}", graph.print_tree(opts.depth));
    Ok(())
}
