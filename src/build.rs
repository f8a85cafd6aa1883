//! Server build from source
//!
//! The server is cloned at a pinned version, patched with every local
//! `<version>.patch` not newer than the pin, built with npm, and the build
//! output is promoted into the cache. Later boots reuse the cached tree.

use crate::cache::{fingerprint_files, CacheKey, CacheStatus, PathCache};
use crate::config::schema::BuildConfig;
use crate::error::{EntrypointError, EntrypointResult};
use crate::process::{run_steps, CommandExecutor, Step};
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Checkout directory inside the staging root, removed after relocation
const SOURCE_DIR: &str = ".source";

/// Suffix of source patch files
const PATCH_SUFFIX: &str = ".patch";

/// A source patch and the version it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePatch {
    pub version: Version,
    pub path: PathBuf,
}

/// Parse a version, tolerating a leading `v`
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    Version::parse(raw.strip_prefix('v').unwrap_or(raw)).ok()
}

/// Find patches in `dir` whose version is not newer than `pinned`, oldest first.
///
/// A missing directory yields no patches.
pub fn discover_patches(dir: &Path, pinned: &Version) -> EntrypointResult<Vec<SourcePatch>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No patch directory at {}", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(EntrypointError::io(
                format!("reading patch directory {}", dir.display()),
                e,
            ))
        }
    };

    let mut patches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EntrypointError::io("reading patch directory", e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(PATCH_SUFFIX) else {
            continue;
        };

        match parse_version(stem) {
            Some(version) if version <= *pinned => patches.push(SourcePatch {
                version,
                path: entry.path(),
            }),
            Some(version) => debug!("Skipping patch {} (newer than {})", version, pinned),
            None => warn!("Ignoring patch file with unparsable version: {}", name),
        }
    }

    patches.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(patches)
}

/// Everything needed to build one server version
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    /// Version as given, used as the git branch
    version: String,
    repository: String,
    project_dir: String,
    output_dir: String,
    patches: Vec<SourcePatch>,
}

impl BuildPipeline {
    /// Plan a build of `version`, selecting patches from `patches_dir`
    pub fn plan(version: &str, config: &BuildConfig, patches_dir: &Path) -> EntrypointResult<Self> {
        let pinned = parse_version(version).ok_or_else(|| EntrypointError::SettingInvalid {
            name: crate::config::settings::env::SPT_VERSION.to_string(),
            reason: format!("{:?} is not a semantic version", version),
        })?;
        let patches = discover_patches(patches_dir, &pinned)?;

        Ok(Self {
            version: version.trim().to_string(),
            repository: config.repository.clone(),
            project_dir: config.project_dir.clone(),
            output_dir: config.output_dir.clone(),
            patches,
        })
    }

    pub fn patches(&self) -> &[SourcePatch] {
        &self.patches
    }

    /// Cache key covering the version and the selected patch contents
    pub fn cache_key(&self) -> EntrypointResult<CacheKey> {
        let paths: Vec<&Path> = self.patches.iter().map(|p| p.path.as_path()).collect();
        Ok(CacheKey::server(&self.version, &fingerprint_files(&paths)?))
    }

    /// Tool chain run against `staging`
    pub fn steps(&self, staging: &Path) -> Vec<Step> {
        let source = staging.join(SOURCE_DIR);
        let project = source.join(&self.project_dir);

        let mut steps = vec![Step::new("clone", "git")
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--branch")
            .arg(&self.version)
            .arg(&self.repository)
            .arg_path(&source)];

        for patch in &self.patches {
            steps.push(
                Step::new(format!("apply patch {}", patch.version), "git")
                    .arg("apply")
                    .arg_path(&patch.path)
                    .cwd(&source),
            );
        }

        steps.push(
            Step::new("fetch large assets", "git")
                .arg("lfs")
                .arg("pull")
                .cwd(&source),
        );
        steps.push(Step::new("install dependencies", "npm").arg("install").cwd(&project));
        steps.push(
            Step::new("build release", "npm")
                .arg("run")
                .arg("build:release")
                .cwd(&project),
        );
        steps
    }

    /// Run the tool chain in `staging` and leave only the build output there
    pub async fn run(&self, executor: &dyn CommandExecutor, staging: &Path) -> EntrypointResult<()> {
        info!(
            "Building server {} with {} patch(es)",
            self.version,
            self.patches.len()
        );
        run_steps(executor, &self.steps(staging)).await?;
        self.relocate_output(staging).await
    }

    async fn relocate_output(&self, staging: &Path) -> EntrypointResult<()> {
        let source = staging.join(SOURCE_DIR);
        let output = source.join(&self.project_dir).join(&self.output_dir);
        debug!("Relocating {} into {}", output.display(), staging.display());

        let mut entries = tokio::fs::read_dir(&output).await.map_err(|e| {
            EntrypointError::io(format!("reading build output {}", output.display()), e)
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EntrypointError::io("reading build output", e))?
        {
            let target = staging.join(entry.file_name());
            tokio::fs::rename(entry.path(), &target).await.map_err(|e| {
                EntrypointError::io(format!("moving {}", entry.path().display()), e)
            })?;
        }

        tokio::fs::remove_dir_all(&source)
            .await
            .map_err(|e| EntrypointError::io("removing source checkout", e))
    }

    /// Build through the cache and materialize the result into `install`
    pub async fn install(
        &self,
        cache: &PathCache,
        executor: &dyn CommandExecutor,
        install: &Path,
    ) -> EntrypointResult<CacheStatus> {
        let key = self.cache_key()?;
        let status = cache
            .ensure(&key, install, |staging| async move {
                self.run(executor, &staging).await
            })
            .await?;
        info!("Server {} installed ({:?})", self.version, status);
        Ok(status)
    }
}

/// Check that a pre-packaged image already ships the server binary
pub fn verify_prepackaged(install: &Path, binary: &str) -> EntrypointResult<()> {
    let path = install.join(binary);
    if path.is_file() {
        info!("Using pre-packaged server at {}", path.display());
        Ok(())
    } else {
        Err(EntrypointError::SettingMissing(format!(
            "{} (no server binary at {})",
            crate::config::settings::env::SPT_VERSION,
            path.display()
        )))
    }
}
