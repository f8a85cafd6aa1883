//! Cache key derivation
//!
//! Keys name cache entry directories, so they are restricted to a
//! filesystem-safe alphabet. Server keys embed a fingerprint of the source
//! patches so changing a patch produces a new build.

use crate::error::{EntrypointError, EntrypointResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;

/// Kind of artifact stored under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Server built from source at a pinned version
    Server,
    /// Extracted mod archive
    Mod,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Server => "server",
            Self::Mod => "mod",
        };
        write!(f, "{}", name)
    }
}

/// Name of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from an artifact kind and its identifying parts
    pub fn new(kind: ArtifactKind, parts: &[&str]) -> Self {
        let mut key = kind.to_string();
        for part in parts {
            key.push('-');
            key.push_str(&sanitize(part));
        }
        Self(key)
    }

    /// Key for a server build at `version` with the given patch fingerprint
    pub fn server(version: &str, fingerprint: &str) -> Self {
        Self::new(ArtifactKind::Server, &[version, fingerprint])
    }

    /// Key for an extracted mod archive, by archive file name
    pub fn for_mod(file_name: &str) -> Self {
        Self::new(ArtifactKind::Mod, &[file_name])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Fingerprint files by name and contents, returning the first 12 hex chars
/// of their combined SHA256. Order matters.
pub fn fingerprint_files(paths: &[&Path]) -> EntrypointResult<String> {
    let mut hasher = Sha256::new();

    for path in paths {
        let contents = fs::read(path).map_err(|e| {
            EntrypointError::io(format!("reading {} for fingerprint", path.display()), e)
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(&contents);
    }

    let result = hasher.finalize();
    // Take first 12 hex characters (6 bytes)
    Ok(hex::encode(&result[..6]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn artifact_kind_display() {
        assert_eq!(ArtifactKind::Server.to_string(), "server");
        assert_eq!(ArtifactKind::Mod.to_string(), "mod");
    }

    #[test]
    fn server_key_format() {
        let key = CacheKey::server("3.10.5", "a1b2c3d4e5f6");
        assert_eq!(key.as_str(), "server-3.10.5-a1b2c3d4e5f6");
    }

    #[test]
    fn mod_key_sanitized() {
        let key = CacheKey::for_mod("Some Mod (v1.2).zip");
        assert_eq!(key.as_str(), "mod-Some_Mod__v1.2_.zip");
        assert!(!CacheKey::for_mod("../evil.zip").as_str().contains('/'));
    }

    #[test]
    fn fingerprint_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.9.0.patch");
        fs::write(&path, b"diff --git a b").unwrap();

        let fp1 = fingerprint_files(&[&path]).unwrap();
        let fp2 = fingerprint_files(&[&path]).unwrap();

        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 12);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.9.0.patch");

        fs::write(&path, b"one").unwrap();
        let fp1 = fingerprint_files(&[&path]).unwrap();
        fs::write(&path, b"two").unwrap();
        let fp2 = fingerprint_files(&[&path]).unwrap();

        assert_ne!(fp1, fp2);
    }

    #[test]
    fn fingerprint_empty_set_is_stable() {
        assert_eq!(
            fingerprint_files(&[]).unwrap(),
            fingerprint_files(&[]).unwrap()
        );
    }

    #[test]
    fn fingerprint_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.patch");
        assert!(matches!(
            fingerprint_files(&[&missing]),
            Err(EntrypointError::Io { .. })
        ));
    }
}
