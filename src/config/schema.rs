//! Configuration schema for the entrypoint
//!
//! Optional settings file, `entrypoint.toml` in the working directory by
//! default. Every section falls back to defaults that match the stock image.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache/data/install roots
    pub paths: PathsConfig,

    /// Server binary settings
    pub server: ServerConfig,

    /// First-launch readiness probe
    pub probe: ProbeConfig,

    /// Build-from-source settings
    pub build: BuildConfig,

    /// Unprivileged account settings
    pub account: AccountConfig,
}

/// Directory roots, relative paths resolve against the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Built and extracted artifacts
    pub cache: PathBuf,

    /// Persistent volume
    pub data: PathBuf,

    /// Live server tree
    pub install: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache: PathBuf::from("cache"),
            data: PathBuf::from("data"),
            install: PathBuf::from("spt"),
        }
    }
}

/// Server binary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Binary name relative to the install root
    pub binary: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: "SPT.Server.exe".to_string(),
        }
    }
}

/// Readiness probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Health endpoint polled during the first launch
    pub url: String,

    /// Delay between polls in milliseconds
    pub interval_ms: u64,

    /// Upper bound for the first launch in seconds
    pub timeout_secs: u64,
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Both bounds must be non-zero
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("probe.interval_ms must be greater than 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("probe.timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6969".to_string(),
            interval_ms: 1000,
            timeout_secs: 120,
        }
    }
}

/// Build-from-source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Upstream server repository
    pub repository: String,

    /// Directory holding `<version>.patch` files
    pub patches_dir: PathBuf,

    /// Node project directory inside the checkout
    pub project_dir: String,

    /// Build output directory inside the project
    pub output_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            repository: "https://github.com/sp-tarkov/server".to_string(),
            patches_dir: PathBuf::from("patches"),
            project_dir: "project".to_string(),
            output_dir: "build".to_string(),
        }
    }
}

/// Pre-provisioned unprivileged account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Account name baked into the image
    pub user: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            user: "spt".to_string(),
        }
    }
}
