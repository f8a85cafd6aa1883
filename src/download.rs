//! Artifact download and extraction
//!
//! Downloads stream an HTTP body to a file; archives are extracted with the
//! system `unzip` / `7z` tools, chosen purely by file name suffix.

use crate::error::{EntrypointError, EntrypointResult};
use crate::process::Step;
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Copy buffer size for downloads
const CHUNK_SIZE: usize = 1024 * 1024;

/// Archive formats understood by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
}

impl ArchiveKind {
    /// Infer the archive format from a file name
    pub fn from_file_name(name: &str) -> EntrypointResult<Self> {
        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".7z") {
            Ok(Self::SevenZip)
        } else {
            Err(EntrypointError::UnrecognizedArchive(name.to_string()))
        }
    }

    /// Step that extracts `archive` into `dest`
    pub fn extract_step(&self, archive: &Path, dest: &Path) -> Step {
        match self {
            Self::Zip => Step::new("extract", "unzip")
                .arg("-o")
                .arg_path(archive)
                .arg("-d")
                .arg_path(dest),
            Self::SevenZip => Step::new("extract", "7z")
                .arg("x")
                .arg_path(archive)
                .arg(format!("-o{}", dest.display())),
        }
    }
}

/// Base file name of a URL, ignoring query string and fragment
pub fn url_file_name(url: &str) -> EntrypointResult<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();

    if name.is_empty() {
        return Err(EntrypointError::SettingInvalid {
            name: "MOD_URLS".to_string(),
            reason: format!("no file name in URL {}", url),
        });
    }
    Ok(name.to_string())
}

/// Fetches a URL into a local file
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` to `dest`. Any status other than 200 is an error.
    async fn fetch(&self, url: &str, dest: &Path) -> EntrypointResult<()>;
}

/// HTTP fetcher backed by `ureq`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> EntrypointResult<()> {
        info!("Downloading {} to {}", url, dest.display());

        let agent = self.agent.clone();
        let (url, dest) = (url.to_string(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || download_blocking(&agent, &url, &dest))
            .await
            .map_err(|e| EntrypointError::Internal(format!("download task failed: {}", e)))?
    }
}

fn download_blocking(agent: &ureq::Agent, url: &str, dest: &Path) -> EntrypointResult<()> {
    let response = agent.get(url).call().map_err(|e| EntrypointError::Download {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(EntrypointError::DownloadStatus {
            url: url.to_string(),
            status,
        });
    }

    let file = File::create(dest)
        .map_err(|e| EntrypointError::io(format!("creating {}", dest.display()), e))?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut reader = response.into_body().into_reader();

    std::io::copy(&mut reader, &mut writer).map_err(|e| EntrypointError::Download {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    writer
        .flush()
        .map_err(|e| EntrypointError::io(format!("writing {}", dest.display()), e))?;

    Ok(())
}

/// Temporary download location that is removed on drop
pub struct DownloadDir {
    dir: tempfile::TempDir,
}

impl DownloadDir {
    pub fn new() -> EntrypointResult<Self> {
        let dir = tempfile::TempDir::new()
            .map_err(|e| EntrypointError::io("creating download directory", e))?;
        Ok(Self { dir })
    }

    /// Path a file with `name` should be downloaded to
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_kind_by_suffix() {
        assert_eq!(ArchiveKind::from_file_name("mod.zip").unwrap(), ArchiveKind::Zip);
        assert_eq!(
            ArchiveKind::from_file_name("mod.7z").unwrap(),
            ArchiveKind::SevenZip
        );
    }

    #[test]
    fn archive_kind_rejects_unknown() {
        let err = ArchiveKind::from_file_name("mod.rar").unwrap_err();
        assert_eq!(err.to_string(), "unrecognized file type mod.rar");
        assert!(ArchiveKind::from_file_name("mod.zip.txt").is_err());
    }

    #[test]
    fn zip_extract_step() {
        let step = ArchiveKind::Zip.extract_step(Path::new("/tmp/a.zip"), Path::new("/spt"));
        assert_eq!(step.command_line(), "unzip -o /tmp/a.zip -d /spt");
    }

    #[test]
    fn seven_zip_extract_step() {
        let step = ArchiveKind::SevenZip.extract_step(Path::new("/tmp/a.7z"), Path::new("/spt"));
        assert_eq!(step.command_line(), "7z x /tmp/a.7z -o/spt");
    }

    #[test]
    fn url_file_name_strips_query() {
        assert_eq!(
            url_file_name("https://example.com/files/SAIN-3.1.zip?download=1#x").unwrap(),
            "SAIN-3.1.zip"
        );
    }

    #[test]
    fn url_file_name_requires_name() {
        assert!(url_file_name("https://example.com/files/").is_err());
    }

    #[test]
    fn download_dir_is_removed_on_drop() {
        let dir = DownloadDir::new().unwrap();
        let file = dir.file("a.zip");
        let parent = file.parent().unwrap().to_path_buf();
        assert!(parent.is_dir());
        drop(dir);
        assert!(!parent.exists());
    }
}
