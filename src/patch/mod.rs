//! Configuration patch engine
//!
//! Patches are keyed by a path relative to the install root. Built-in
//! defaults are merged with user patches, every target path is validated,
//! and each file is then patched with the dialect chosen by its suffix:
//!
//! | Suffix | Patcher |
//! |--------|---------|
//! | `.json` | [`StructuredPatcher`] (RFC 6902) |
//! | `.cfg` | [`SectionedKeyValuePatcher`] (`/section/key` replace) |
//!
//! A file that fails is logged and counted; the remaining files are still
//! attempted and the apply fails with the number of failed files.

pub mod cfg;
pub mod json;

pub use cfg::SectionedKeyValuePatcher;
pub use json::StructuredPatcher;

use crate::config::relative_subpath;
use crate::error::{EntrypointError, EntrypointResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Server HTTP config, rebound to all interfaces by default
pub const HTTP_CONFIG: &str = "SPT_Data/Server/configs/http.json";

/// One patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Keep an explicit `null` value distinct from an absent one
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl PatchOperation {
    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.into(),
            value: Some(value.into()),
            from: None,
        }
    }
}

/// Relative file path -> ordered patch operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatches(BTreeMap<String, Vec<PatchOperation>>);

impl ConfigPatches {
    /// Parse a JSON object of `path -> [operation, ...]`
    pub fn parse(name: &str, raw: &str) -> EntrypointResult<Self> {
        serde_json::from_str(raw)
            .map(Self)
            .map_err(|source| EntrypointError::PatchDocument {
                name: name.to_string(),
                source,
            })
    }

    /// Patches every boot applies before user patches
    pub fn builtin() -> Self {
        let mut patches = BTreeMap::new();
        patches.insert(
            HTTP_CONFIG.to_string(),
            vec![
                PatchOperation::replace("/ip", "0.0.0.0"),
                PatchOperation::replace("/backendIp", "0.0.0.0"),
            ],
        );
        Self(patches)
    }

    /// Concatenate per key, `self` first then `other`
    pub fn merge(mut self, other: &ConfigPatches) -> Self {
        for (path, ops) in &other.0 {
            self.0
                .entry(path.clone())
                .or_default()
                .extend(ops.iter().cloned());
        }
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, ops: Vec<PatchOperation>) {
        self.0.insert(path.into(), ops);
    }

    pub fn get(&self, path: &str) -> Option<&[PatchOperation]> {
        self.0.get(path).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of operations across all files
    pub fn count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Number of target files
    pub fn files(&self) -> usize {
        self.0.len()
    }

    /// Check every target path without touching the filesystem
    pub fn validate(&self) -> EntrypointResult<()> {
        self.targets().map(|_| ())
    }

    fn targets(&self) -> EntrypointResult<Vec<(PathBuf, &[PatchOperation])>> {
        let mut targets = Vec::with_capacity(self.0.len());
        for (path, ops) in &self.0 {
            targets.push((relative_subpath(path)?, ops.as_slice()));
        }
        Ok(targets)
    }
}

/// Mutates the contents of one configuration file
pub trait FilePatcher: Send + Sync {
    /// Apply `ops` to `content`, returning the new contents.
    /// `path` is only used for error context.
    fn apply(&self, path: &Path, content: &str, ops: &[PatchOperation]) -> EntrypointResult<String>;
}

/// Pick the patcher for a file by suffix
pub fn patcher_for(path: &Path) -> EntrypointResult<&'static dyn FilePatcher> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(&StructuredPatcher),
        Some("cfg") => Ok(&SectionedKeyValuePatcher),
        _ => Err(EntrypointError::UnsupportedPatchFile(path.to_path_buf())),
    }
}

/// Applies [`ConfigPatches`] to files under an install root
pub struct PatchEngine {
    root: PathBuf,
}

impl PatchEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Apply all patches. Paths are validated before any file is read.
    pub async fn apply(&self, patches: &ConfigPatches) -> EntrypointResult<()> {
        let targets = patches.targets()?;
        let total = targets.len();
        let mut failed = 0;

        for (rel, ops) in targets {
            let path = self.root.join(&rel);
            info!("Applying {} patch(es) to {}", ops.len(), rel.display());
            if let Err(e) = self.apply_file(&path, ops).await {
                error!(category = e.category(), "Failed to patch {}: {}", rel.display(), e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(EntrypointError::PatchesFailed { failed, total });
        }
        Ok(())
    }

    async fn apply_file(&self, path: &Path, ops: &[PatchOperation]) -> EntrypointResult<()> {
        let patcher = patcher_for(path)?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EntrypointError::io(format!("reading {}", path.display()), e))?;
        let patched = patcher.apply(path, &content, ops)?;
        tokio::fs::write(path, patched)
            .await
            .map_err(|e| EntrypointError::io(format!("writing {}", path.display()), e))
    }
}
