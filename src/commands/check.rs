// src/commands/check.rs

//! Check command - validate host prerequisites

use anyhow::Result;
use crossbake::prerequisites::{PrerequisiteReport, check_prerequisites};
use crossbake::{ConsentMode, EnvFlags, HostPlatform, PrerequisiteChecker};
use tracing::info;

/// Prerequisite checker for the running host
pub(crate) fn host_checker(flags: &EnvFlags) -> PrerequisiteChecker {
    PrerequisiteChecker::new(HostPlatform::detect(), ConsentMode::from_flags(flags))
}

pub(crate) fn log_pkg_config_paths(report: &PrerequisiteReport) {
    for path in &report.pkg_config_paths {
        info!("pkg-config files available in {}", path.display());
    }
}

pub fn cmd_check() -> Result<()> {
    let flags = EnvFlags::from_env();
    let checker = host_checker(&flags);

    match check_prerequisites(&checker, &flags)? {
        Some(report) => {
            log_pkg_config_paths(&report);
            println!(
                "[OK] {} met, {} installed, {} optional missing",
                report.met.len(),
                report.installed.len(),
                report.missing_optional.len()
            );
            for name in &report.missing_optional {
                println!("  missing (optional): {}", name);
            }
        }
        None => println!("Prerequisite checks skipped"),
    }
    Ok(())
}
