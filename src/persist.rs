//! Persistent data links
//!
//! Selected subpaths of the install tree are replaced by symlinks into the
//! data root so they survive container recreation.

use crate::config::relative_subpath;
use crate::error::{EntrypointError, EntrypointResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Always persisted
pub const PROFILES_SUBPATH: &str = "user/profiles";

/// `["user/profiles"] ++ extra`, de-duplicated keeping first occurrence
pub fn merge_data_dirs(extra: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(PROFILES_SUBPATH.to_string())
        .chain(extra.iter().cloned())
        .filter(|dir| seen.insert(dir.clone()))
        .collect()
}

/// Links install-side subpaths to their data-side counterparts
pub struct DataLinker {
    install: PathBuf,
    data: PathBuf,
}

impl DataLinker {
    pub fn new(install: &Path, data: &Path) -> Self {
        Self {
            install: install.to_path_buf(),
            data: data.to_path_buf(),
        }
    }

    /// Link every subpath. Safe to repeat on every boot.
    pub async fn link_all(&self, subpaths: &[String]) -> EntrypointResult<()> {
        let subpaths = subpaths
            .iter()
            .map(|s| relative_subpath(s))
            .collect::<EntrypointResult<Vec<_>>>()?;

        for subpath in &subpaths {
            self.link(subpath).await?;
        }
        Ok(())
    }

    async fn link(&self, subpath: &Path) -> EntrypointResult<()> {
        let data_path = self.data.join(subpath);
        let install_path = self.install.join(subpath);
        info!("Persisting {}", subpath.display());

        tokio::fs::create_dir_all(&data_path)
            .await
            .map_err(|e| EntrypointError::io(format!("creating {}", data_path.display()), e))?;
        if let Some(parent) = install_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EntrypointError::io(format!("creating {}", parent.display()), e))?;
        }

        remove_existing(&install_path).await?;

        tokio::fs::symlink(&data_path, &install_path)
            .await
            .map_err(|e| {
                EntrypointError::io(
                    format!(
                        "linking {} -> {}",
                        install_path.display(),
                        data_path.display()
                    ),
                    e,
                )
            })
    }
}

/// Remove whatever occupies `path`, without following symlinks
async fn remove_existing(path: &Path) -> EntrypointResult<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(EntrypointError::io(format!("inspecting {}", path.display()), e)),
    };

    debug!("Replacing existing {}", path.display());
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    result.map_err(|e| EntrypointError::io(format!("removing {}", path.display()), e))
}
