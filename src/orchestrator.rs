//! Worker pipeline
//!
//! Runs every boot stage in order and stops at the first failure:
//!
//! 1. Validate patch targets and persisted subpaths
//! 2. Create the cache/data/install roots
//! 3. Install the server (cached build, or pre-packaged)
//! 4. Install mods
//! 5. First launch, until the server is ready
//! 6. Apply configuration patches
//! 7. Link persistent data
//! 8. Run the server attached

use crate::build::{verify_prepackaged, BuildPipeline};
use crate::cache::PathCache;
use crate::config::{relative_subpath, Config, DirectorySet, Settings};
use crate::download::{Fetcher, HttpFetcher};
use crate::error::EntrypointResult;
use crate::mods::ModInstaller;
use crate::patch::{ConfigPatches, PatchEngine};
use crate::persist::{merge_data_dirs, DataLinker};
use crate::probe::{HealthCheck, HttpHealthCheck, ReadinessProbe, ServerCommand};
use crate::process::{CommandExecutor, SystemExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Boot pipeline for one worker process
pub struct Orchestrator<'a> {
    config: &'a Config,
    settings: &'a Settings,
    dirs: &'a DirectorySet,
    base: PathBuf,
    executor: Box<dyn CommandExecutor>,
    fetcher: Box<dyn Fetcher>,
    health: Arc<dyn HealthCheck>,
}

impl<'a> Orchestrator<'a> {
    /// Pipeline backed by real processes and HTTP; `base` anchors relative config paths
    pub fn new(config: &'a Config, settings: &'a Settings, dirs: &'a DirectorySet, base: &Path) -> Self {
        let health = HttpHealthCheck::new(&config.probe.url, config.probe.interval());
        Self {
            config,
            settings,
            dirs,
            base: base.to_path_buf(),
            executor: Box::new(SystemExecutor),
            fetcher: Box::new(HttpFetcher::new()),
            health: Arc::new(health),
        }
    }

    pub fn with_executor(mut self, executor: Box<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = health;
        self
    }

    /// The server as launched for both the probe and the final run
    pub fn server_command(&self) -> ServerCommand {
        ServerCommand::new(
            self.dirs.install.join(&self.config.server.binary),
            &self.dirs.install,
        )
    }

    /// Run the full pipeline, ending with the attached server
    pub async fn run(&self) -> EntrypointResult<()> {
        self.prepare().await?;
        info!("Stage: run server");
        self.server_command().run_attached().await
    }

    /// Every stage before the final run
    pub async fn prepare(&self) -> EntrypointResult<()> {
        let patches = ConfigPatches::builtin().merge(&self.settings.config_patches);
        let data_dirs = merge_data_dirs(&self.settings.data_dirs);

        info!("Stage: preflight");
        patches.validate()?;
        for dir in &data_dirs {
            relative_subpath(dir)?;
        }
        debug!(
            "{} patch operation(s) across {} file(s), {} persisted path(s)",
            patches.count(),
            patches.files(),
            data_dirs.len()
        );

        info!("Stage: prepare directories");
        self.dirs.ensure().await?;
        let cache = PathCache::new(&self.dirs.cache);
        let stale = cache.prune_staging().await?;
        if stale > 0 {
            warn!("Removed {} interrupted cache entr(ies)", stale);
        }

        info!("Stage: install server");
        self.install_server(&cache).await?;

        info!("Stage: install mods");
        ModInstaller::new(&cache, self.fetcher.as_ref(), self.executor.as_ref())
            .install_all(&self.settings.mod_urls, &self.dirs.install)
            .await?;

        info!("Stage: initialize server");
        ReadinessProbe::new(
            Arc::clone(&self.health),
            self.config.probe.interval(),
            self.config.probe.timeout(),
        )
        .initialize(&self.server_command())
        .await?;

        info!("Stage: apply config patches");
        PatchEngine::new(&self.dirs.install).apply(&patches).await?;

        info!("Stage: link persistent data");
        DataLinker::new(&self.dirs.install, &self.dirs.data)
            .link_all(&data_dirs)
            .await?;

        Ok(())
    }

    async fn install_server(&self, cache: &PathCache) -> EntrypointResult<()> {
        match self.settings.spt_version {
            Some(ref version) => {
                let patches_dir = self.base.join(&self.config.build.patches_dir);
                BuildPipeline::plan(version, &self.config.build, &patches_dir)?
                    .install(cache, self.executor.as_ref(), &self.dirs.install)
                    .await?;
                Ok(())
            }
            None => verify_prepackaged(&self.dirs.install, &self.config.server.binary),
        }
    }
}
