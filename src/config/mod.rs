//! Configuration management for the entrypoint
//!
//! Three layers, all built once at process start and passed down by reference:
//! the optional TOML [`Config`], the environment [`Settings`], and the
//! resolved [`DirectorySet`].

pub mod paths;
pub mod schema;
pub mod settings;

pub use paths::{relative_subpath, DirectorySet};
pub use schema::Config;
pub use settings::Settings;

use crate::error::{EntrypointError, EntrypointResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Default settings file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "entrypoint.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager reading `entrypoint.toml` under `base`
    pub fn new(base: &Path) -> Self {
        Self {
            config_path: base.join(DEFAULT_CONFIG_FILE),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> EntrypointResult<Config> {
        if !self.config_path.exists() {
            debug!(
                "Config file {} not found, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> EntrypointResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| EntrypointError::io(format!("reading config from {}", path.display()), e))?;

        let invalid = |reason: String| EntrypointError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        };
        let config: Config = toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        config.probe.validate().map_err(invalid)?;
        Ok(config)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
