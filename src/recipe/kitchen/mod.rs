// src/recipe/kitchen/mod.rs

//! Kitchen: where recipes are cooked
//!
//! The Kitchen drives the resolved build order through the per-recipe
//! lifecycle for every target architecture. Architectures are cooked in
//! parallel on the rayon pool; inside one architecture recipes run strictly
//! in build order. The first failure on an architecture stops that
//! architecture only; the others carry on.

mod archive;
mod config;
mod cook;
mod fetch;
mod lock;

pub use archive::{PatchApplier, PatchCommand, extract_archive, verify_checksum};
pub use config::KitchenConfig;
pub use cook::{ArchProgress, BuildState, Cook, CookFailure, CookOutcome};
pub use fetch::{FetchError, HttpFetcher, SourceFetcher, fetch_with_retry};
pub use lock::ArchLock;

use crate::context::{Architecture, BuildContext};
use crate::error::{Error, Result};
use crate::process::ToolRunner;
use crate::recipe::resolver::BuildOrder;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use tracing::{error, info};

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    fetcher: Arc<dyn SourceFetcher>,
    patcher: Arc<dyn PatchApplier>,
    /// Serialises access to the shared download cache
    fetch_lock: Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl Kitchen {
    /// Create a Kitchen that downloads over HTTP and patches with `patch`
    pub fn new(config: KitchenConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.http_timeout())?.with_progress(config.verbose);
        let runner = ToolRunner::new(config.tool_timeout(), config.verbose);
        Ok(Self {
            fetcher: Arc::new(fetcher),
            patcher: Arc::new(PatchCommand::new(runner)),
            fetch_lock: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Replace the source fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the patch applier
    pub fn with_patcher(mut self, patcher: Arc<dyn PatchApplier>) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Flag that stops every architecture before its next state transition
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn runner(&self) -> ToolRunner {
        ToolRunner::new(self.config.tool_timeout(), self.config.verbose)
    }

    /// Cook the resolved build order for every architecture
    ///
    /// An architecture that cannot take its build lock is reported as
    /// failed; the others still cook.
    pub fn cook_all(&self, ctx: &BuildContext) -> Result<KitchenReport> {
        let order = ctx.build_order().ok_or_else(|| {
            Error::ConfigError("the build order has not been resolved".to_string())
        })?;

        info!(
            "Cooking {} recipes for {} architectures",
            order.len(),
            ctx.archs().len()
        );

        let archs = ctx
            .archs()
            .par_iter()
            .map(|arch| {
                self.cook_arch(ctx, order, arch)
                    .unwrap_or_else(|error| ArchReport::setup_failed(arch, order, error))
            })
            .collect::<Vec<_>>();

        let report = KitchenReport { archs };
        for failure in report.failures() {
            error!("{}", failure);
        }
        Ok(report)
    }

    /// Cook the build order for one architecture
    ///
    /// Only locking and I/O problems outside any recipe are returned as
    /// errors; recipe failures end up in the report.
    pub fn cook_arch(&self, ctx: &BuildContext, order: &BuildOrder, arch: &Architecture) -> Result<ArchReport> {
        let _lock = ArchLock::acquire(&ctx.layout().lock_file(&arch.name))?;

        let mut report = ArchReport {
            arch: arch.name.clone(),
            built: Vec::new(),
            skipped: Vec::new(),
            failure: None,
            not_attempted: Vec::new(),
        };
        let mut progress = ArchProgress::new();

        for name in order.recipes() {
            if report.failure.is_some() {
                report.not_attempted.push(name.clone());
                continue;
            }

            let recipe = ctx.recipe(name)?;
            let mut cook = Cook::new(self, ctx, order, recipe, arch);
            match cook.run(&mut progress) {
                Ok(CookOutcome::Built { .. }) => report.built.push(name.clone()),
                Ok(CookOutcome::Skipped) => report.skipped.push(name.clone()),
                Err(failure) => report.failure = Some(failure),
            }
        }

        if report.not_attempted.is_empty() && report.failure.is_none() {
            info!(
                "{}: {} built, {} up to date",
                arch,
                report.built.len(),
                report.skipped.len()
            );
        }
        Ok(report)
    }
}

/// Outcome of cooking one architecture
#[derive(Debug)]
pub struct ArchReport {
    pub arch: String,
    pub built: Vec<String>,
    pub skipped: Vec<String>,
    pub failure: Option<CookFailure>,
    /// Recipes left queued after the failure
    pub not_attempted: Vec<String>,
}

impl ArchReport {
    /// Report for an architecture that could not start cooking at all
    fn setup_failed(arch: &Architecture, order: &BuildOrder, error: Error) -> Self {
        let mut queued = order.recipes().iter().cloned();
        let recipe = queued.next().unwrap_or_default();
        Self {
            arch: arch.name.clone(),
            built: Vec::new(),
            skipped: Vec::new(),
            failure: Some(CookFailure {
                recipe,
                arch: arch.name.clone(),
                state: BuildState::Unfetched,
                error,
                output_tail: Vec::new(),
            }),
            not_attempted: queued.collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Recipes that are done for this architecture
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.built.iter().chain(self.skipped.iter()).map(String::as_str)
    }
}

/// Outcome of cooking every architecture
#[derive(Debug)]
pub struct KitchenReport {
    pub archs: Vec<ArchReport>,
}

impl KitchenReport {
    pub fn is_success(&self) -> bool {
        self.archs.iter().all(ArchReport::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CookFailure> {
        self.archs.iter().filter_map(|a| a.failure.as_ref())
    }

    pub fn arch(&self, name: &str) -> Option<&ArchReport> {
        self.archs.iter().find(|a| a.arch == name)
    }

    /// Architectures whose whole build order completed
    pub fn successful_archs(&self) -> impl Iterator<Item = &str> {
        self.archs
            .iter()
            .filter(|a| a.is_success())
            .map(|a| a.arch.as_str())
    }
}
