//! Directory roots and relative-path validation

use crate::config::schema::PathsConfig;
use crate::error::{EntrypointError, EntrypointResult};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Resolved cache/data/install roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySet {
    /// Built and extracted artifacts, keyed by fingerprint
    pub cache: PathBuf,
    /// Persistent volume surviving container recreation
    pub data: PathBuf,
    /// Live server tree
    pub install: PathBuf,
}

impl DirectorySet {
    /// Resolve configured roots against `base` (normally the working directory)
    pub fn resolve(paths: &PathsConfig, base: &Path) -> Self {
        Self {
            cache: base.join(&paths.cache),
            data: base.join(&paths.data),
            install: base.join(&paths.install),
        }
    }

    /// All roots, in ownership order
    pub fn all(&self) -> [&Path; 3] {
        [&self.cache, &self.data, &self.install]
    }

    /// Create any root that does not exist yet
    pub async fn ensure(&self) -> EntrypointResult<()> {
        for dir in self.all() {
            if !dir.exists() {
                info!("Creating directory {}", dir.display());
                fs::create_dir_all(dir).await.map_err(|e| {
                    EntrypointError::io(format!("creating directory {}", dir.display()), e)
                })?;
            }
        }
        Ok(())
    }
}

/// Validate a user-supplied subpath that will be joined onto a root.
///
/// Rejects absolute paths, `..` components, and paths that name the root
/// itself (empty or `.`).
pub fn relative_subpath(raw: &str) -> EntrypointResult<PathBuf> {
    if raw.starts_with('/') || raw.starts_with(std::path::MAIN_SEPARATOR) {
        return Err(EntrypointError::PathNotRelative(raw.to_string()));
    }

    let path = Path::new(raw);
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(EntrypointError::PathNotRelative(raw.to_string()))
            }
            Component::ParentDir => return Err(EntrypointError::PathEscapes(raw.to_string())),
        }
    }

    if normal == 0 {
        return Err(EntrypointError::PathEscapes(raw.to_string()));
    }

    Ok(path.to_path_buf())
}
