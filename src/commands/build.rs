// src/commands/build.rs

//! Build command - cook every architecture and assemble the distribution

use super::check::{host_checker, log_pkg_config_paths};
use super::{load_config, load_context};
use crate::cli::TargetArgs;
use anyhow::Result;
use crossbake::process::ToolRunner;
use crossbake::recipe::kitchen::{CookFailure, KitchenReport};
use crossbake::{Assembler, EnvFlags, Kitchen, KitchenConfig, Pipeline};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Build the requested recipes
pub fn cmd_build(
    config_path: Option<&Path>,
    target: &TargetArgs,
    force: bool,
    jobs: Option<usize>,
    no_strip: bool,
) -> Result<()> {
    let started = Instant::now();
    let flags = EnvFlags::from_env();

    let mut config = load_config(config_path, target)?;
    config.kitchen = apply_build_flags(config.kitchen, &flags, force, jobs, no_strip);

    let mut ctx = load_context(&config)?;
    let checker = host_checker(&flags);
    let kitchen = Kitchen::new(config.kitchen.clone())?;
    let runner = ToolRunner::new(config.kitchen.tool_timeout(), config.kitchen.verbose);
    let assembler = Assembler::new(runner).with_strip(config.kitchen.strip_libraries);

    let report = Pipeline::new(&checker, flags, &kitchen, &assembler).run(&mut ctx)?;

    if let Some(prerequisites) = &report.prerequisites {
        log_pkg_config_paths(prerequisites);
    }
    for (arch, dist) in &report.distributions {
        println!("[OK] {} assembled in {}", arch, dist.display());
    }
    print_summary(&report.kitchen);

    if !report.is_success() {
        let failed: Vec<&str> = report.kitchen.failures().map(|f| f.arch.as_str()).collect();
        anyhow::bail!("Build failed for {}", failed.join(", "));
    }

    info!("Build finished in {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

/// Layer the build command's flags over the configured kitchen settings
fn apply_build_flags(
    kitchen: KitchenConfig,
    flags: &EnvFlags,
    force: bool,
    jobs: Option<usize>,
    no_strip: bool,
) -> KitchenConfig {
    let force_rebuild = force || kitchen.force_rebuild;
    let verbose = kitchen.verbose || flags.full_log;
    let mut kitchen = kitchen.with_force_rebuild(force_rebuild).with_verbose(verbose);
    if let Some(jobs) = jobs {
        kitchen = kitchen.with_jobs(jobs);
    }
    if no_strip {
        kitchen.strip_libraries = false;
    }
    kitchen
}

fn print_summary(report: &KitchenReport) {
    for arch in &report.archs {
        println!(
            "{}: {} built, {} up to date",
            arch.arch,
            arch.built.len(),
            arch.skipped.len()
        );
        if let Some(failure) = &arch.failure {
            print_failure(failure);
            if !arch.not_attempted.is_empty() {
                println!("  not attempted: {}", arch.not_attempted.join(", "));
            }
        }
    }
}

fn print_failure(failure: &CookFailure) {
    eprintln!(
        "[FAILED] {} on {} at stage {} ({})",
        failure.recipe,
        failure.arch,
        failure.state,
        failure.error.category()
    );
    eprintln!("  {}", failure.error);
    if let Some(hint) = failure.error.remediation() {
        eprintln!("  hint: {}", hint);
    }
    if !failure.output_tail.is_empty() {
        eprintln!("  last output:");
        for line in &failure.output_tail {
            eprintln!("    {}", line);
        }
    }
}
