// src/pipeline.rs

//! The whole build run: prerequisites, resolution, cooking, assembly
//!
//! Each stage only starts when the previous one succeeded, so a missing
//! mandatory host tool or an unsatisfiable dependency stops the run before
//! any recipe is touched.

use crate::bootstrap::Assembler;
use crate::context::{BuildContext, EnvFlags};
use crate::error::Result;
use crate::prerequisites::{PrerequisiteChecker, PrerequisiteReport, check_prerequisites};
use crate::recipe::kitchen::{Kitchen, KitchenReport};
use std::path::PathBuf;
use tracing::{info, warn};

/// What a finished run produced
#[derive(Debug)]
pub struct PipelineReport {
    /// `None` when prerequisite checks were skipped
    pub prerequisites: Option<PrerequisiteReport>,
    pub kitchen: KitchenReport,
    /// Distribution directory per assembled architecture
    pub distributions: Vec<(String, PathBuf)>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.kitchen.is_success()
    }
}

/// Drives one build run
pub struct Pipeline<'a> {
    checker: &'a PrerequisiteChecker,
    flags: EnvFlags,
    kitchen: &'a Kitchen,
    assembler: &'a Assembler,
    check_toolchain: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        checker: &'a PrerequisiteChecker,
        flags: EnvFlags,
        kitchen: &'a Kitchen,
        assembler: &'a Assembler,
    ) -> Self {
        Self {
            checker,
            flags,
            kitchen,
            assembler,
            check_toolchain: true,
        }
    }

    /// Skip the NDK layout check (for recipes that never call the compiler)
    pub fn with_toolchain_check(mut self, check: bool) -> Self {
        self.check_toolchain = check;
        self
    }

    /// Run every stage against `ctx`
    ///
    /// Setup errors (prerequisites, toolchain, resolution) are returned
    /// before anything is built. Recipe failures are reported per
    /// architecture in the returned report; architectures that completed
    /// are assembled either way.
    pub fn run(&self, ctx: &mut BuildContext) -> Result<PipelineReport> {
        let prerequisites = check_prerequisites(self.checker, &self.flags)?;

        if self.check_toolchain {
            ctx.toolchain().verify()?;
        }
        ctx.resolve()?;

        let kitchen = self.kitchen.cook_all(ctx)?;

        let mut distributions = Vec::new();
        for name in kitchen.successful_archs() {
            let Some(arch) = ctx.arch(name) else {
                continue;
            };
            let dist = self.assembler.assemble(ctx, arch)?;
            info!("{} assembled in {}", arch, dist.display());
            distributions.push((arch.name.clone(), dist));
        }
        if !kitchen.is_success() {
            warn!(
                "{} of {} architectures failed",
                kitchen.failures().count(),
                kitchen.archs.len()
            );
        }

        Ok(PipelineReport {
            prerequisites,
            kitchen,
            distributions,
        })
    }
}
