//! Mod archive installation

use crate::cache::{CacheKey, CacheStatus, PathCache};
use crate::download::{url_file_name, ArchiveKind, DownloadDir, Fetcher};
use crate::error::{EntrypointError, EntrypointResult};
use crate::process::CommandExecutor;
use std::path::Path;
use tracing::info;

/// Installs mod archives into the server tree through the cache
pub struct ModInstaller<'a> {
    cache: &'a PathCache,
    fetcher: &'a dyn Fetcher,
    executor: &'a dyn CommandExecutor,
}

impl<'a> ModInstaller<'a> {
    pub fn new(
        cache: &'a PathCache,
        fetcher: &'a dyn Fetcher,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            cache,
            fetcher,
            executor,
        }
    }

    /// Install every URL in order into `install`, stopping at the first failure
    pub async fn install_all(&self, urls: &[String], install: &Path) -> EntrypointResult<()> {
        for url in urls {
            self.install(url, install).await?;
        }
        Ok(())
    }

    /// Install one mod archive
    pub async fn install(&self, url: &str, install: &Path) -> EntrypointResult<CacheStatus> {
        let file_name = url_file_name(url)?;
        // Rejected before any network access
        let kind = ArchiveKind::from_file_name(&file_name)?;
        let key = CacheKey::for_mod(&file_name);

        info!("Installing mod {}", file_name);
        let status = self
            .cache
            .ensure(&key, install, |staging| async move {
                let downloads = DownloadDir::new()?;
                let archive = downloads.file(&file_name);
                self.fetcher.fetch(url, &archive).await?;
                self.executor
                    .run(&kind.extract_step(&archive, &staging))
                    .await?;
                Ok::<_, EntrypointError>(())
            })
            .await?;
        info!("Mod {} installed ({:?})", key, status);
        Ok(status)
    }
}
