//! CLI command implementations

pub mod entrypoint;
pub mod pre_entrypoint;
pub mod version;

pub use entrypoint::execute as entrypoint;
pub use pre_entrypoint::execute as pre_entrypoint;
pub use version::execute as version;

use crate::config::{Config, ConfigManager, DirectorySet, Settings};
use crate::error::{EntrypointError, EntrypointResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything a boot command needs, resolved once
#[derive(Debug, Clone)]
pub struct Context {
    /// Working directory relative paths resolve against
    pub base: PathBuf,
    pub config: Config,
    pub settings: Settings,
    pub dirs: DirectorySet,
}

impl Context {
    /// Load the settings file and the environment, anchored at the working directory
    pub async fn load(config_path: Option<&Path>) -> EntrypointResult<Self> {
        let base = std::env::current_dir()
            .map_err(|e| EntrypointError::io("getting current directory", e))?;
        Self::load_in(&base, config_path).await
    }

    pub async fn load_in(base: &Path, config_path: Option<&Path>) -> EntrypointResult<Self> {
        let manager = match config_path {
            Some(path) => ConfigManager::with_path(base.join(path)),
            None => ConfigManager::new(base),
        };
        let config = manager.load().await?;
        let settings = Settings::from_env()?;
        let dirs = DirectorySet::resolve(&config.paths, base);
        debug!("Directories: {:?}", dirs);

        Ok(Self {
            base: base.to_path_buf(),
            config,
            settings,
            dirs,
        })
    }
}
