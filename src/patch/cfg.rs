//! `replace` patches against sectioned key/value files
//!
//! ```text
//! [Http]
//! Port = 6969      <- /Http/Port
//! ```

use super::{FilePatcher, PatchOperation};
use crate::error::{EntrypointError, EntrypointResult};
use serde_json::Value;
use std::path::Path;

/// Rewrites the first `key = ...` line inside a `[section]`
#[derive(Debug, Default, Clone, Copy)]
pub struct SectionedKeyValuePatcher;

impl FilePatcher for SectionedKeyValuePatcher {
    fn apply(&self, path: &Path, content: &str, ops: &[PatchOperation]) -> EntrypointResult<String> {
        let fail = |reason: String| EntrypointError::PatchApply {
            path: path.to_path_buf(),
            reason,
        };

        let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
        for op in ops {
            if op.op != "replace" {
                return Err(fail(format!("unsupported operation {:?}", op.op)));
            }
            let (section, key) = split_pointer(&op.path)
                .ok_or_else(|| fail(format!("path {:?} is not /section/key", op.path)))?;
            let value = op
                .value
                .as_ref()
                .map(render_value)
                .ok_or_else(|| fail(format!("replace of {} has no value", op.path)))?;

            if !replace_first(&mut lines, section, key, &value) {
                return Err(fail(format!("key {} not found in [{}]", key, section)));
            }
        }

        Ok(lines.join("\n"))
    }
}

/// Split `/section/key` into its two parts
fn split_pointer(pointer: &str) -> Option<(&str, &str)> {
    let rest = pointer.strip_prefix('/')?;
    let (section, key) = rest.split_once('/')?;
    if section.is_empty() || key.is_empty() || key.contains('/') {
        return None;
    }
    Some((section, key))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn section_header(line: &str) -> Option<&str> {
    line.trim().strip_prefix('[')?.strip_suffix(']')
}

/// Rewrite the first matching key in `section`. Returns whether a line changed.
fn replace_first(lines: &mut [String], section: &str, key: &str, value: &str) -> bool {
    let mut current: Option<String> = None;

    for line in lines.iter_mut() {
        if let Some(name) = section_header(line) {
            current = Some(name.to_string());
            continue;
        }
        if current.as_deref() != Some(section) {
            continue;
        }
        let matches = line
            .split_once('=')
            .is_some_and(|(left, _)| left.trim() == key);
        if matches {
            let eol = if line.ends_with('\r') { "\r" } else { "" };
            *line = format!("{} = {}{}", key, value, eol);
            return true;
        }
    }
    false
}
