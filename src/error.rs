//! Error types for the entrypoint
//!
//! All modules use `EntrypointResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for entrypoint operations
pub type EntrypointResult<T> = Result<T, EntrypointError>;

/// All errors that can occur while booting the server
#[derive(Error, Debug)]
pub enum EntrypointError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid value for {name}: {reason}")]
    SettingInvalid { name: String, reason: String },

    #[error("Missing required setting: {0}")]
    SettingMissing(String),

    #[error("Malformed patch document in {name}: {source}")]
    PatchDocument {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    // Path safety errors
    #[error("patch path {0} not relative")]
    PathNotRelative(String),

    #[error("Path escapes its root: {0}")]
    PathEscapes(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("GET {url} sent non-200 status code: {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("unrecognized file type {0}")]
    UnrecognizedArchive(String),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Step '{step}' failed ({command}), exit code: {code}, stderr: {stderr}")]
    Subprocess {
        step: String,
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },

    // Patch errors
    #[error("Failed to patch {path}: {reason}")]
    PatchApply { path: PathBuf, reason: String },

    #[error("unsupported file {0}")]
    UnsupportedPatchFile(PathBuf),

    #[error("failed to apply patches: {failed} of {total} file(s) failed")]
    PatchesFailed { failed: usize, total: usize },

    // Privilege errors
    #[error("refusing to update {user} user to uid 0")]
    RootUidRefused { user: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EntrypointError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error (the program could not be spawned)
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a subprocess error for a step that exited unsuccessfully
    pub fn subprocess(
        step: impl Into<String>,
        command: impl Into<String>,
        code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Subprocess {
            step: step.into(),
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Taxonomy bucket this error belongs to, used as a structured log field
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. }
            | Self::SettingInvalid { .. }
            | Self::SettingMissing(_)
            | Self::PatchDocument { .. } => "configuration",
            Self::PathNotRelative(_) | Self::PathEscapes(_) => "path-safety",
            Self::Io { .. }
            | Self::Download { .. }
            | Self::DownloadStatus { .. }
            | Self::UnrecognizedArchive(_) => "io",
            Self::CommandFailed { .. } | Self::Subprocess { .. } => "subprocess",
            Self::Timeout { .. } => "timeout",
            Self::PatchApply { .. }
            | Self::UnsupportedPatchFile(_)
            | Self::PatchesFailed { .. } => "patch-apply",
            Self::RootUidRefused { .. } | Self::AccountNotFound(_) | Self::Privilege(_) => {
                "privilege"
            }
            Self::Internal(_) => "internal",
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SettingMissing(_) => Some("Set SPT_VERSION or use an image that ships the server"),
            Self::PatchDocument { .. } => {
                Some("CONFIG_PATCHES must be a JSON object of path -> [patch, ...]")
            }
            Self::PathNotRelative(_) | Self::PathEscapes(_) => {
                Some("Patch and data paths are relative to the server directory")
            }
            Self::RootUidRefused { .. } => Some("Set UID to a non-zero value"),
            Self::Timeout { .. } => Some("Check the server log above for startup errors"),
            _ => None,
        }
    }
}
