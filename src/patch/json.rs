//! RFC 6902 patches against JSON documents

use super::{FilePatcher, PatchOperation};
use crate::error::{EntrypointError, EntrypointResult};
use serde_json::Value;
use std::path::Path;

/// Applies JSON Patch operations; output is pretty-printed with key order kept
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredPatcher;

impl FilePatcher for StructuredPatcher {
    fn apply(&self, path: &Path, content: &str, ops: &[PatchOperation]) -> EntrypointResult<String> {
        let fail = |reason: String| EntrypointError::PatchApply {
            path: path.to_path_buf(),
            reason,
        };

        let mut doc: Value = serde_json::from_str(content).map_err(|e| fail(e.to_string()))?;
        let patch: json_patch::Patch = serde_json::to_value(ops)
            .and_then(serde_json::from_value)
            .map_err(|e| fail(format!("invalid patch operation: {}", e)))?;

        json_patch::patch(&mut doc, &patch).map_err(|e| fail(e.to_string()))?;

        serde_json::to_string_pretty(&doc).map_err(|e| fail(e.to_string()))
    }
}
