//! Content-addressed directory cache
//!
//! Entries are populated in a staging directory inside the cache root and
//! promoted with a single rename, so an entry is either complete or absent.

use crate::cache::key::CacheKey;
use crate::error::{EntrypointError, EntrypointResult};
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Prefix of in-progress staging directories under the cache root
const STAGING_PREFIX: &str = ".staging-";

/// Outcome of [`PathCache::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Entry already existed and was reused
    Hit,
    /// Entry was populated during this call
    Populated,
}

/// Directory cache keyed by [`CacheKey`]
#[derive(Debug, Clone)]
pub struct PathCache {
    root: PathBuf,
}

impl PathCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an entry lives in once promoted
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Whether a complete entry exists for `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_dir()
    }

    /// Materialize the entry for `key` into `dest`, populating it first if needed.
    ///
    /// `populate` receives an empty staging directory. On success the staging
    /// directory is renamed to the entry path; on failure it is removed and the
    /// error is returned, leaving the key absent.
    pub async fn ensure<F, Fut>(
        &self,
        key: &CacheKey,
        dest: &Path,
        populate: F,
    ) -> EntrypointResult<CacheStatus>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = EntrypointResult<()>>,
    {
        let entry = self.entry_path(key);

        if self.contains(key) {
            debug!("Cache hit: {}", key);
            materialize(&entry, dest).await?;
            return Ok(CacheStatus::Hit);
        }

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            EntrypointError::io(format!("creating cache root {}", self.root.display()), e)
        })?;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| EntrypointError::io("creating cache staging directory", e))?;

        info!("Cache miss: {}, populating", key);
        // Dropping `staging` on any early return removes it.
        populate(staging.path().to_path_buf()).await?;

        tokio::fs::rename(staging.path(), &entry)
            .await
            .map_err(|e| EntrypointError::io(format!("promoting cache entry {}", key), e))?;
        // The rename moved the directory away; the guard's cleanup finds nothing.
        drop(staging);
        debug!("Cache entry promoted: {}", entry.display());

        materialize(&entry, dest).await?;
        Ok(CacheStatus::Populated)
    }

    /// Remove staging directories left behind by an interrupted run
    pub async fn prune_staging(&self) -> EntrypointResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(EntrypointError::io("reading cache root", e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EntrypointError::io("reading cache root", e))?
        {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                warn!("Removing stale cache staging {}", entry.path().display());
                tokio::fs::remove_dir_all(entry.path()).await.map_err(|e| {
                    EntrypointError::io(format!("removing {}", entry.path().display()), e)
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Copy a cache entry into `dest` on the blocking pool
async fn materialize(entry: &Path, dest: &Path) -> EntrypointResult<()> {
    debug!("Materializing {} into {}", entry.display(), dest.display());
    let (entry, dest) = (entry.to_path_buf(), dest.to_path_buf());
    tokio::task::spawn_blocking(move || copy_tree(&entry, &dest))
        .await
        .map_err(|e| EntrypointError::Internal(format!("materialize task failed: {}", e)))?
}

/// Recursively copy `src` into `dst`, preserving symlinks.
///
/// Existing symlinks in `dst` are replaced rather than written through, so a
/// copy never lands inside a persistent volume linked into the tree.
fn copy_tree(src: &Path, dst: &Path) -> EntrypointResult<()> {
    let io_err = |path: &Path, e: io::Error| EntrypointError::io(format!("copying {}", path.display()), e);

    fs::create_dir_all(dst).map_err(|e| io_err(dst, e))?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| io_err(src, e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| EntrypointError::Internal(e.to_string()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if let Ok(meta) = fs::symlink_metadata(&target) {
            if meta.file_type().is_symlink() || (file_type.is_symlink() && !meta.is_dir()) {
                fs::remove_file(&target).map_err(|e| io_err(&target, e))?;
            } else if file_type.is_symlink() {
                fs::remove_dir_all(&target).map_err(|e| io_err(&target, e))?;
            }
        }

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| io_err(entry.path(), e))?;
            std::os::unix::fs::symlink(&link, &target).map_err(|e| io_err(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| io_err(entry.path(), e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::for_mod("example.zip")
    }

    async fn write_file(dir: PathBuf, name: &str, body: &str) -> EntrypointResult<()> {
        tokio::fs::write(dir.join(name), body)
            .await
            .map_err(|e| EntrypointError::io("test write", e))
    }

    #[tokio::test]
    async fn populates_once_then_hits() {
        let temp = TempDir::new().unwrap();
        let cache = PathCache::new(temp.path().join("cache"));
        let dest = temp.path().join("dest");
        let calls = AtomicUsize::new(0);

        for expected in [CacheStatus::Populated, CacheStatus::Hit] {
            let status = cache
                .ensure(&key(), &dest, |dir| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    write_file(dir, "mod.dll", "payload")
                })
                .await
                .unwrap();
            assert_eq!(status, expected);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(dest.join("mod.dll")).unwrap(), "payload");
        assert!(cache.contains(&key()));
    }

    #[tokio::test]
    async fn hit_survives_restart() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let dest = temp.path().join("dest");

        PathCache::new(&root)
            .ensure(&key(), &dest, |dir| write_file(dir, "a", "1"))
            .await
            .unwrap();

        let status = PathCache::new(&root)
            .ensure(&key(), &dest, |_| async {
                Err::<(), _>(EntrypointError::Internal("must not populate".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn failed_populate_leaves_nothing_visible() {
        let temp = TempDir::new().unwrap();
        let cache = PathCache::new(temp.path().join("cache"));
        let dest = temp.path().join("dest");

        let err = cache
            .ensure(&key(), &dest, |dir| async move {
                write_file(dir, "partial", "half").await?;
                Err::<(), _>(EntrypointError::Internal("boom".to_string()))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));

        assert!(!cache.contains(&key()));
        assert_eq!(fs::read_dir(cache.root()).unwrap().count(), 0);
        assert!(!dest.join("partial").exists());

        // Not poisoned
        let status = cache
            .ensure(&key(), &dest, |dir| write_file(dir, "full", "ok"))
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Populated);
        assert!(dest.join("full").exists());
    }

    #[tokio::test]
    async fn materialize_preserves_symlinks_and_nesting() {
        let temp = TempDir::new().unwrap();
        let cache = PathCache::new(temp.path().join("cache"));
        let dest = temp.path().join("dest");

        cache
            .ensure(&key(), &dest, |dir| async move {
                fs::create_dir_all(dir.join("BepInEx/plugins")).unwrap();
                fs::write(dir.join("BepInEx/plugins/a.dll"), "a").unwrap();
                std::os::unix::fs::symlink("plugins/a.dll", dir.join("BepInEx/link")).unwrap();
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("BepInEx/plugins/a.dll")).unwrap(),
            "a"
        );
        assert_eq!(
            fs::read_link(dest.join("BepInEx/link")).unwrap(),
            PathBuf::from("plugins/a.dll")
        );
    }

    #[tokio::test]
    async fn materialize_replaces_dest_symlinks() {
        let temp = TempDir::new().unwrap();
        let cache = PathCache::new(temp.path().join("cache"));
        let dest = temp.path().join("dest");
        let volume = temp.path().join("volume");
        fs::create_dir_all(&volume).unwrap();
        fs::create_dir_all(dest.join("user")).unwrap();
        std::os::unix::fs::symlink(&volume, dest.join("user/profiles")).unwrap();

        cache
            .ensure(&key(), &dest, |dir| async move {
                fs::create_dir_all(dir.join("user/profiles")).unwrap();
                fs::write(dir.join("user/profiles/default.json"), "{}").unwrap();
                Ok(())
            })
            .await
            .unwrap();

        assert!(!volume.join("default.json").exists());
        assert!(dest.join("user/profiles/default.json").is_file());
    }

    #[tokio::test]
    async fn prune_staging_removes_leftovers() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        fs::create_dir_all(root.join(".staging-abc123/inner")).unwrap();
        fs::create_dir_all(root.join("mod-keep.zip")).unwrap();

        let cache = PathCache::new(&root);
        assert_eq!(cache.prune_staging().await.unwrap(), 1);
        assert!(root.join("mod-keep.zip").is_dir());
        assert!(!root.join(".staging-abc123").exists());
    }

    #[tokio::test]
    async fn prune_staging_missing_root() {
        let temp = TempDir::new().unwrap();
        let cache = PathCache::new(temp.path().join("absent"));
        assert_eq!(cache.prune_staging().await.unwrap(), 0);
    }
}
