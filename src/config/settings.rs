//! Environment settings
//!
//! Parsed once at process start. Lookup is injected so tests never touch the
//! real process environment.

use crate::error::{EntrypointError, EntrypointResult};
use crate::patch::ConfigPatches;

/// Environment variable names
pub mod env {
    /// Target gid for the unprivileged account
    pub const GID: &str = "GID";
    /// Target uid for the unprivileged account
    pub const UID: &str = "UID";
    /// Comma-separated mod archive URLs
    pub const MOD_URLS: &str = "MOD_URLS";
    /// JSON object: relative path -> patch operations
    pub const CONFIG_PATCHES: &str = "CONFIG_PATCHES";
    /// Comma-separated extra persisted subpaths
    pub const DATA_DIRS: &str = "DATA_DIRS";
    /// Upstream server version to build
    pub const SPT_VERSION: &str = "SPT_VERSION";
}

/// Values read from the environment
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mod_urls: Vec<String>,
    pub config_patches: ConfigPatches,
    pub data_dirs: Vec<String>,
    pub spt_version: Option<String>,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> EntrypointResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> EntrypointResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_patches = match non_empty(env::CONFIG_PATCHES) {
            Some(raw) => ConfigPatches::parse(env::CONFIG_PATCHES, &raw)?,
            None => ConfigPatches::default(),
        };

        Ok(Self {
            uid: parse_id(env::UID, non_empty(env::UID))?,
            gid: parse_id(env::GID, non_empty(env::GID))?,
            mod_urls: non_empty(env::MOD_URLS)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            config_patches,
            data_dirs: non_empty(env::DATA_DIRS)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            spt_version: non_empty(env::SPT_VERSION).map(|v| v.trim().to_string()),
        })
    }
}

/// Split a comma-separated list, trimming entries and dropping empties
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_id(name: &str, raw: Option<String>) -> EntrypointResult<Option<u32>> {
    raw.map(|v| {
        v.trim().parse::<u32>().map_err(|e| EntrypointError::SettingInvalid {
            name: name.to_string(),
            reason: format!("{:?}: {}", v, e),
        })
    })
    .transpose()
}
