// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use crossbake::recipe::kitchen::{FetchError, PatchApplier, SourceFetcher};
use crossbake::recipe::{BuildJob, BuildProcedure};
use crossbake::{BuildConfig, BuildContext, HostPlatform, KitchenConfig, Recipe, RecipeRegistry};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Config rooted in a temp dir, with a fake NDK and no retry delay
pub fn test_config(root: &Path, archs: &[&str], requirements: &[&str]) -> BuildConfig {
    let ndk = root.join("ndk");
    fs::create_dir_all(ndk.join("toolchains/llvm/prebuilt/linux-x86_64/bin")).unwrap();

    BuildConfig::new()
        .with_archs(archs.iter().copied())
        .with_ndk(ndk, "28c")
        .with_storage_dir(root.join("storage"))
        .with_dist_name("demo")
        .with_requirements(requirements.iter().copied())
        .with_kitchen(
            KitchenConfig::new()
                .with_fetch_retries(2)
                .with_fetch_retry_delay(Duration::ZERO)
                .with_tool_timeout(Duration::from_secs(30))
                .with_jobs(1),
        )
}

/// Build a context on a linux host from in-memory recipes
pub fn test_context(config: &BuildConfig, recipes: Vec<Recipe>) -> BuildContext {
    let registry: RecipeRegistry = recipes.into_iter().collect();
    BuildContext::with_host(config, registry, HostPlatform::Linux).unwrap()
}

/// Gzipped tarball with every file under one top-level directory
pub fn tarball(top: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/{name}"), *content)
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn sha256(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Serves fixed bytes per URL and counts requests
#[derive(Clone, Default)]
pub struct FakeFetcher {
    sources: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, data: Vec<u8>) {
        self.sources.lock().unwrap().insert(url.to_string(), data);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let data = self.sources.lock().unwrap().get(url).cloned();
        let Some(data) = data else {
            return Err(FetchError::Permanent {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            });
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(dest, data).unwrap();
        Ok(())
    }
}

/// Records applied patches instead of running `patch`
#[derive(Clone, Default)]
pub struct RecordingPatcher {
    applied: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl RecordingPatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// (patch file name, source dir) in application order
    pub fn applied(&self) -> Vec<(String, PathBuf)> {
        self.applied.lock().unwrap().clone()
    }
}

impl PatchApplier for RecordingPatcher {
    fn apply(&self, patch: &Path, source_dir: &Path, _strip: u32) -> crossbake::Result<()> {
        let name = patch
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.applied
            .lock()
            .unwrap()
            .push((name, source_dir.to_path_buf()));
        Ok(())
    }
}

/// Patcher whose every patch is rejected
#[derive(Clone, Default)]
pub struct RejectingPatcher;

impl PatchApplier for RejectingPatcher {
    fn apply(&self, patch: &Path, _source_dir: &Path, _strip: u32) -> crossbake::Result<()> {
        Err(crossbake::Error::PatchFailed {
            patch: patch.display().to_string(),
            reason: "Hunk #1 FAILED at 12.".to_string(),
        })
    }
}

/// One build as seen by [`WriteArtifacts`]
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub recipe: String,
    pub arch: String,
    pub env: BTreeMap<String, String>,
}

/// Build procedure that writes the declared artifacts without a compiler
///
/// Fails through a real tool invocation on the architectures listed in
/// `fail_on`.
#[derive(Clone, Default)]
pub struct WriteArtifacts {
    pub builds: Arc<Mutex<Vec<BuildRecord>>>,
    pub fail_on: Vec<String>,
}

impl WriteArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(arch: &str) -> Self {
        Self {
            fail_on: vec![arch.to_string()],
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<BuildRecord> {
        self.builds.lock().unwrap().clone()
    }

    pub fn count(&self, recipe: &str) -> usize {
        self.records().iter().filter(|b| b.recipe == recipe).count()
    }
}

impl BuildProcedure for WriteArtifacts {
    fn build(&self, job: &BuildJob<'_>) -> crossbake::Result<Vec<PathBuf>> {
        self.builds.lock().unwrap().push(BuildRecord {
            recipe: job.recipe.name.clone(),
            arch: job.arch.name.clone(),
            env: job.env.vars().clone(),
        });

        if self.fail_on.contains(&job.arch.name) {
            job.run("sh", &["-c", "echo compiling; echo 'error: boom' >&2; exit 3"], job.build_dir)?;
        }

        for (file, dir) in &job.recipe.artifacts {
            let dir = job.build_dir.join(dir);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(file), format!("{} for {}", file, job.arch.name))?;
        }
        Ok(job.declared_artifacts())
    }
}

/// A fresh temp dir plus the fakes most tests need
pub struct Fixture {
    pub dir: TempDir,
    pub fetcher: FakeFetcher,
    pub patcher: RecordingPatcher,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            fetcher: FakeFetcher::new(),
            patcher: RecordingPatcher::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn kitchen(&self, config: &BuildConfig) -> crossbake::Kitchen {
        self.kitchen_with_patcher(config, Arc::new(self.patcher.clone()))
    }

    pub fn kitchen_with_patcher(
        &self,
        config: &BuildConfig,
        patcher: Arc<dyn PatchApplier>,
    ) -> crossbake::Kitchen {
        crossbake::Kitchen::new(config.kitchen.clone())
            .unwrap()
            .with_fetcher(Arc::new(self.fetcher.clone()))
            .with_patcher(patcher)
    }
}
