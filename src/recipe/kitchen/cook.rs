// src/recipe/kitchen/cook.rs

//! Cook: one recipe on one architecture
//!
//! A cook walks the recipe through
//! `Unfetched -> Fetched -> Verified -> Extracted -> Patched ->
//! EnvironmentReady -> Building -> ArtifactsCollected -> Done`.
//! Before every transition it checks the kitchen's cancel flag. Any error
//! moves it to `Failed` and is reported as a [`CookFailure`] naming the
//! stage that failed.
//!
//! Stamps in the per-arch work directory make reruns cheap: `.unpacked`
//! marks an intact extraction, `.patched` (inside the build dir) marks a
//! patched tree, and `.crossbake-build.json` records the environment
//! fingerprint of the last successful build.

use super::Kitchen;
use super::archive::{extract_archive, verify_checksum};
use super::fetch::fetch_with_retry;
use crate::context::{Architecture, BuildContext};
use crate::environment::{BuildEnv, EnvironmentComposer};
use crate::error::{Error, Result};
use crate::process::ToolRunner;
use crate::recipe::procedure::BuildJob;
use crate::recipe::resolver::BuildOrder;
use crate::recipe::Recipe;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use thiserror::Error;
use tracing::{debug, info, warn};

const UNPACK_STAMP: &str = ".unpacked";
const PATCH_STAMP: &str = ".patched";
const BUILD_STAMP: &str = ".crossbake-build.json";

/// Lifecycle state of one recipe on one architecture
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuildState {
    Unfetched,
    Fetched,
    Verified,
    Extracted,
    Patched,
    EnvironmentReady,
    Building,
    ArtifactsCollected,
    Done,
    Failed,
}

/// A recipe that failed on one architecture
#[derive(Debug, Error)]
#[error("{recipe} failed for {arch} at stage {state}: {error}")]
pub struct CookFailure {
    pub recipe: String,
    pub arch: String,
    /// Stage being entered when the error happened
    pub state: BuildState,
    #[source]
    pub error: Error,
    /// Last lines printed by the failing tool, if any
    pub output_tail: Vec<String>,
}

/// How a successful cook ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookOutcome {
    /// Went through the full lifecycle; holds the collected artifact paths
    Built { artifacts: Vec<PathBuf> },
    /// Artifacts were already in place
    Skipped,
}

/// Recipes completed on one architecture during this run
#[derive(Debug, Clone, Default)]
pub struct ArchProgress {
    done: HashSet<String>,
}

impl ArchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_done(&mut self, recipe: &str) {
        self.done.insert(recipe.to_string());
    }

    pub fn is_done(&self, recipe: &str) -> bool {
        self.done.contains(recipe)
    }

    pub fn completed(&self) -> &HashSet<String> {
        &self.done
    }
}

/// Fingerprint record written when a build finishes
#[derive(Debug, Serialize, Deserialize)]
struct BuildStamp {
    recipe: String,
    version: String,
    arch: String,
    fingerprint: String,
    built_at: String,
}

/// A single cook operation
pub struct Cook<'a> {
    kitchen: &'a Kitchen,
    ctx: &'a BuildContext,
    order: &'a BuildOrder,
    recipe: &'a Recipe,
    arch: &'a Architecture,
    runner: ToolRunner,
    work_dir: PathBuf,
    build_dir: PathBuf,
    libs_dir: PathBuf,
    state: BuildState,
}

impl<'a> Cook<'a> {
    pub fn new(
        kitchen: &'a Kitchen,
        ctx: &'a BuildContext,
        order: &'a BuildOrder,
        recipe: &'a Recipe,
        arch: &'a Architecture,
    ) -> Self {
        let layout = ctx.layout();
        Self {
            kitchen,
            ctx,
            order,
            recipe,
            arch,
            runner: kitchen.runner().labelled(format!("{}:{}", arch.name, recipe.name)),
            work_dir: layout.arch_work_dir(&recipe.name, &arch.name),
            build_dir: layout.recipe_build_dir(&recipe.name, &arch.name),
            libs_dir: ctx.libs_dir(arch),
            state: BuildState::Unfetched,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Run the whole lifecycle, recording completion in `progress`
    pub fn run(&mut self, progress: &mut ArchProgress) -> std::result::Result<CookOutcome, CookFailure> {
        let env = EnvironmentComposer::new(self.ctx, self.order).compose(
            self.recipe,
            self.arch,
            progress.completed(),
        );

        if self.can_skip(&env) {
            info!(
                "{} for {}: artifacts up to date, skipping",
                self.recipe.name, self.arch
            );
            self.state = BuildState::Done;
            progress.mark_done(&self.recipe.name);
            return Ok(CookOutcome::Skipped);
        }

        info!("Cooking {} {} for {}", self.recipe.name, self.recipe.version, self.arch);

        let archive = self.step(BuildState::Fetched, |cook| cook.fetch())?;
        self.step(BuildState::Verified, |cook| cook.verify(archive.as_deref()))?;
        self.step(BuildState::Extracted, |cook| cook.extract(archive.as_deref()))?;
        self.step(BuildState::Patched, |cook| cook.patch())?;
        self.step(BuildState::EnvironmentReady, |cook| cook.check_dependencies(progress))?;
        self.step(BuildState::Building, |cook| cook.build(&env))?;
        let artifacts = self.step(BuildState::ArtifactsCollected, |cook| cook.collect())?;
        self.step(BuildState::Done, |cook| cook.write_stamp(&env))?;

        progress.mark_done(&self.recipe.name);
        info!("{} for {}: done", self.recipe.name, self.arch);
        Ok(CookOutcome::Built { artifacts })
    }

    fn step<T>(
        &mut self,
        next: BuildState,
        work: impl FnOnce(&mut Self) -> Result<T>,
    ) -> std::result::Result<T, CookFailure> {
        let result = if self.kitchen.cancel.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            work(self)
        };

        match result {
            Ok(value) => {
                debug!("{} for {}: {} -> {}", self.recipe.name, self.arch, self.state, next);
                self.state = next;
                Ok(value)
            }
            Err(error) => {
                self.state = BuildState::Failed;
                let output_tail = match &error {
                    Error::Tool(tool) => tool.output_tail().to_vec(),
                    _ => Vec::new(),
                };
                Err(CookFailure {
                    recipe: self.recipe.name.clone(),
                    arch: self.arch.name.clone(),
                    state: next,
                    error,
                    output_tail,
                })
            }
        }
    }

    /// Skip rule: declared artifacts all collected and the recorded
    /// fingerprint, if any, still matches
    fn can_skip(&self, env: &BuildEnv) -> bool {
        if self.kitchen.config.force_rebuild || self.recipe.artifacts.is_empty() {
            return false;
        }
        if !self
            .recipe
            .artifacts
            .keys()
            .all(|file| self.libs_dir.join(file).is_file())
        {
            return false;
        }

        let stamp_path = self.work_dir.join(BUILD_STAMP);
        if !stamp_path.exists() {
            return true;
        }
        let stamp: Option<BuildStamp> = fs::read_to_string(&stamp_path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok());
        match stamp {
            Some(stamp) => {
                let fresh = stamp.fingerprint == env.fingerprint()
                    && stamp.version == self.recipe.version.as_str();
                if !fresh {
                    debug!("{} for {}: environment changed since last build", self.recipe.name, self.arch);
                }
                fresh
            }
            None => {
                warn!("Ignoring unreadable build stamp {}", stamp_path.display());
                false
            }
        }
    }

    /// Download the source into the package cache
    fn fetch(&mut self) -> Result<Option<PathBuf>> {
        let (Some(url), Some(filename)) = (self.recipe.source_url(), self.recipe.archive_filename())
        else {
            debug!("{} has no source to fetch", self.recipe.name);
            return Ok(None);
        };
        let path = self.ctx.layout().package_dir(&self.recipe.name).join(filename);

        let _guard = self.kitchen.fetch_lock.lock().unwrap_or_else(|e| e.into_inner());
        if path.is_file() {
            debug!("Using cached source {}", path.display());
        } else {
            self.download(&url, &path)?;
        }
        Ok(Some(path))
    }

    fn download(&self, url: &str, path: &Path) -> Result<()> {
        let config = &self.kitchen.config;
        fetch_with_retry(
            self.kitchen.fetcher.as_ref(),
            url,
            path,
            config.fetch_retries,
            config.fetch_retry_delay(),
        )?;
        Ok(())
    }

    /// Check the declared hash; a mismatching cache file is fetched again once
    fn verify(&mut self, archive: Option<&Path>) -> Result<()> {
        let (Some(path), Some(checksum)) = (archive, self.recipe.checksum.as_deref()) else {
            return Ok(());
        };

        let _guard = self.kitchen.fetch_lock.lock().unwrap_or_else(|e| e.into_inner());
        match verify_checksum(path, checksum) {
            Err(Error::ChecksumMismatch { actual, .. }) => {
                warn!(
                    "Checksum mismatch for {} (got {}), discarding and fetching again",
                    path.display(),
                    actual
                );
                fs::remove_file(path)?;
                if let Some(url) = self.recipe.source_url() {
                    self.download(&url, path)?;
                }
                verify_checksum(path, checksum)
            }
            other => other,
        }
    }

    /// Unpack into the build dir unless an intact unpack is already there
    fn extract(&mut self, archive: Option<&Path>) -> Result<()> {
        fs::create_dir_all(&self.work_dir)?;
        let stamp = self.work_dir.join(UNPACK_STAMP);
        let marker = archive
            .and_then(|a| a.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "none".to_string());

        if self.build_dir.is_dir() {
            let intact = fs::read_to_string(&stamp).is_ok_and(|s| s.trim() == marker);
            if intact {
                debug!("{} already unpacked for {}", self.recipe.name, self.arch);
                return Ok(());
            }
            info!("Removing incomplete build directory {}", self.build_dir.display());
            fs::remove_dir_all(&self.build_dir)?;
        }
        let _ = fs::remove_file(&stamp);

        match archive {
            Some(archive) => extract_archive(archive, &self.build_dir, &self.runner)?,
            None => fs::create_dir_all(&self.build_dir)?,
        }
        fs::write(&stamp, format!("{marker}\n"))?;
        Ok(())
    }

    /// Apply every patch whose guard holds, once per build directory
    fn patch(&mut self) -> Result<()> {
        let stamp = self.build_dir.join(PATCH_STAMP);
        if stamp.exists() {
            debug!("{} already patched for {}", self.recipe.name, self.arch);
            return Ok(());
        }

        let mut applied = Vec::new();
        for patch in &self.recipe.patches {
            if let Some(guard) = &patch.when
                && !guard.evaluate(self.arch, self.recipe, self.ctx)?
            {
                debug!("Skipping patch {} for {}", patch.file.display(), self.arch);
                continue;
            }

            let path = self.recipe.patch_path(patch);
            info!("Applying patch {} to {}", patch.file.display(), self.recipe.name);
            if let Err(e) = self.kitchen.patcher.apply(&path, &self.build_dir, patch.strip) {
                // A half-patched tree must be unpacked again on the next run
                let _ = fs::remove_file(self.work_dir.join(UNPACK_STAMP));
                return Err(e);
            }
            applied.push(patch.file.display().to_string());
        }

        let mut content = applied.join("\n");
        content.push('\n');
        fs::write(&stamp, content)?;
        Ok(())
    }

    /// Every chosen dependency must be done for this architecture
    fn check_dependencies(&mut self, progress: &ArchProgress) -> Result<()> {
        if let Some(missing) = self
            .order
            .dependencies(&self.recipe.name)
            .iter()
            .find(|dep| !progress.is_done(dep))
        {
            return Err(Error::DependencyNotReady {
                recipe: self.recipe.name.clone(),
                dependency: missing.clone(),
                arch: self.arch.name.clone(),
            });
        }
        Ok(())
    }

    fn build(&mut self, env: &BuildEnv) -> Result<()> {
        fs::create_dir_all(&self.libs_dir)?;
        let job = BuildJob {
            recipe: self.recipe,
            arch: self.arch,
            context: self.ctx,
            env,
            build_dir: &self.build_dir,
            runner: &self.runner,
            jobs: self.kitchen.config.jobs,
        };
        let produced = self.recipe.procedure.build(&job)?;
        debug!(
            "{} ({}) reported {} artifacts",
            self.recipe.name,
            self.recipe.procedure.family(),
            produced.len()
        );
        Ok(())
    }

    /// Copy declared artifacts into the architecture's libs dir
    fn collect(&mut self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.libs_dir)?;
        let mut collected = Vec::new();
        for (file, dir) in &self.recipe.artifacts {
            let source = self.build_dir.join(dir).join(file);
            if !source.is_file() {
                return Err(Error::MissingArtifact {
                    artifact: file.clone(),
                    expected: source.display().to_string(),
                });
            }
            let dest = self.libs_dir.join(file);
            fs::copy(&source, &dest)?;
            debug!("Collected {}", dest.display());
            collected.push(dest);
        }
        Ok(collected)
    }

    fn write_stamp(&mut self, env: &BuildEnv) -> Result<()> {
        let stamp = BuildStamp {
            recipe: self.recipe.name.clone(),
            version: self.recipe.version.to_string(),
            arch: self.arch.name.clone(),
            fingerprint: env.fingerprint(),
            built_at: chrono::Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&stamp)
            .map_err(|e| Error::IoError(format!("Failed to serialize build stamp: {}", e)))?;
        fs::write(self.work_dir.join(BUILD_STAMP), content)?;
        Ok(())
    }
}
