//! Loading the inputs every operation shares.
//!
//! [`preflight`] reads `Lockstep.toml`, the index snapshot, the previous
//! lockfile (if any) and the resolution config, and hands them back as one
//! [`Project`].

use std::path::{Path, PathBuf};

use lockstep_core::config::ResolveConfig;
use lockstep_core::lockfile::LockState;
use lockstep_core::manifest::Manifest;
use lockstep_core::source::Source;
use lockstep_core::{INDEX_FILE, LOCKFILE, MANIFEST_FILE};
use lockstep_resolver::Index;
use lockstep_util::errors::LockstepError;

/// Where to find the inputs. Unset paths are looked up from the current
/// directory.
#[derive(Debug, Clone, Default)]
pub struct ProjectPaths {
    pub manifest: Option<PathBuf>,
    pub index: Option<PathBuf>,
}

/// Everything an operation needs, loaded from disk.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub manifest: Manifest,
    pub index: Index,
    pub lock: Option<LockState>,
    /// The lockfile exactly as read, for change detection on write.
    pub lock_text: Option<String>,
    pub config: ResolveConfig,
}

impl Project {
    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(LOCKFILE)
    }

    /// Directory name, used as the root of the dependency tree.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }
}

/// Locate and load the project.
pub fn preflight(paths: &ProjectPaths) -> miette::Result<Project> {
    let manifest_path = match &paths.manifest {
        Some(path) => path.clone(),
        None => {
            let cwd = std::env::current_dir().map_err(LockstepError::Io)?;
            let root = lockstep_util::fs::find_ancestor_with(&cwd, MANIFEST_FILE).ok_or_else(
                || LockstepError::Manifest {
                    message: format!(
                        "could not find {MANIFEST_FILE} in {} or any parent directory",
                        cwd.display()
                    ),
                },
            )?;
            root.join(MANIFEST_FILE)
        }
    };
    let root = match manifest_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tracing::debug!("project root: {}", root.display());

    let mut manifest = Manifest::from_path(&manifest_path)?;
    attach_digests(&mut manifest, &root);

    let index_path = paths
        .index
        .clone()
        .unwrap_or_else(|| root.join(INDEX_FILE));
    let index = load_index(&index_path, &manifest.all_sources())?;

    let lockfile_path = root.join(LOCKFILE);
    let (lock, lock_text) = if lockfile_path.is_file() {
        let text = std::fs::read_to_string(&lockfile_path).map_err(|e| LockstepError::Lockfile {
            message: format!("Failed to read {}: {e}", lockfile_path.display()),
        })?;
        (Some(LockState::from_str(&text)?), Some(text))
    } else {
        tracing::debug!("no {LOCKFILE} yet");
        (None, None)
    };

    let config = ResolveConfig::load(&root)?;
    Ok(Project {
        root,
        manifest,
        index,
        lock,
        lock_text,
        config,
    })
}

/// Load an index snapshot, ranking entries by the declared source order.
pub fn load_index(path: &Path, sources: &[Source]) -> miette::Result<Index> {
    let content = std::fs::read_to_string(path).map_err(|e| LockstepError::Index {
        message: format!("Failed to read {}: {e}", path.display()),
    })?;
    let index =
        Index::from_snapshot_ordered(&content, sources).map_err(|e| LockstepError::Index {
            message: format!("Failed to parse {}: {e}", path.display()),
        })?;
    tracing::debug!(
        "loaded {} package names from {}",
        index.names().count(),
        path.display()
    );
    for shadowed in index.shadowed() {
        tracing::debug!(
            "{} from {} shadows {}",
            shadowed.kept.full_name(),
            shadowed.kept.source,
            shadowed.dropped.source
        );
    }
    Ok(index)
}

/// Record the content digest of every path source that exists on disk.
fn attach_digests(manifest: &mut Manifest, root: &Path) {
    let sources = manifest
        .sources
        .iter_mut()
        .chain(manifest.dependencies.iter_mut().filter_map(|d| d.source.as_mut()));
    for source in sources {
        let Source::Path { path, digest } = source else {
            continue;
        };
        let dir = root.join(path.as_str());
        if !dir.is_dir() {
            continue;
        }
        match lockstep_util::hash::sha256_dir(&dir) {
            Ok(hex) => *digest = Some(hex),
            Err(e) => tracing::warn!("could not hash {}: {e}", dir.display()),
        }
    }
}
