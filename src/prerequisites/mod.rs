// src/prerequisites/mod.rs

//! Host prerequisites
//!
//! Before any recipe is cooked the host has to provide a handful of tools:
//! autotools, cmake, pkg-config, OpenSSL and a JDK, plus Homebrew on macOS
//! to install them with. Each tool is a [`Prerequisite`] with per-OS
//! mandatory and installer-supported flags. The [`PrerequisiteChecker`]
//! probes every prerequisite for the running host, offers to install the
//! missing ones, and refuses to continue while a mandatory one is unmet.
//!
//! This is the only part of crossbake that changes the host outside the
//! storage directory.

mod tools;

pub use tools::{BrewTool, Homebrew, Jdk, required_prerequisites};

use crate::context::{EnvFlags, HostPlatform};
use crate::error::{Error, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

/// Access to the host, so checks can run against a simulated machine
pub trait HostProbe: Send + Sync {
    /// Locate a program on PATH
    fn find_program(&self, name: &str) -> Option<PathBuf>;

    /// Trimmed stdout of a command that exited successfully
    fn output(&self, program: &str, args: &[&str]) -> Option<String>;

    /// Run a command to completion, failing on a non-zero exit
    fn run(&self, program: &str, args: &[&str]) -> Result<()>;
}

/// Probes the real host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn find_program(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn output(&self, program: &str, args: &[&str]) -> Option<String> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!stdout.is_empty()).then_some(stdout)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| Error::IoError(format!("Failed to run {}: {}", program, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::IoError(format!(
                "{} {} exited with {}",
                program,
                args.join(" "),
                status
            )))
        }
    }
}

/// A host tool needed before any recipe build
pub trait Prerequisite: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the build must stop when this tool is missing on `host`
    fn mandatory(&self, host: &HostPlatform) -> bool;

    /// Whether [`Prerequisite::install`] can do anything on `host`
    fn installer_supported(&self, host: &HostPlatform) -> bool;

    /// Whether the tool is present on `host`
    fn check(&self, host: &HostPlatform, probe: &dyn HostProbe) -> bool;

    /// Install the tool
    fn install(&self, host: &HostPlatform, _probe: &dyn HostProbe) -> Result<()> {
        Err(Error::InstallFailed {
            name: self.name().to_string(),
            reason: format!("no installer on {host}"),
        })
    }

    /// How to get the tool by hand
    fn helper(&self, host: &HostPlatform) -> Option<String>;

    /// Extra `pkg-config` search directory the tool provides on `host`
    fn pkg_config_location(&self, _host: &HostPlatform, _probe: &dyn HostProbe) -> Option<PathBuf> {
        None
    }
}

/// Whether installing a missing tool needs the user's consent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentMode {
    /// Ask on the terminal
    Interactive,
    /// Install without asking (CI)
    Unattended,
}

impl ConsentMode {
    pub fn from_flags(flags: &EnvFlags) -> Self {
        if flags.interactive_install {
            Self::Interactive
        } else {
            Self::Unattended
        }
    }
}

/// Asks the user whether to install a tool
pub trait ConsentPrompt: Send + Sync {
    fn confirm(&self, prerequisite: &str) -> bool;
}

/// Reads a yes/no answer from stdin
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl ConsentPrompt for StdinPrompt {
    fn confirm(&self, prerequisite: &str) -> bool {
        print!("Do you want to install {}? [y/N] ", prerequisite);
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// What a prerequisite pass found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrerequisiteReport {
    /// Present from the start
    pub met: Vec<String>,
    /// Installed during this pass
    pub installed: Vec<String>,
    /// Missing but not mandatory
    pub missing_optional: Vec<String>,
    /// Directories to add to PKG_CONFIG_PATH
    pub pkg_config_paths: Vec<PathBuf>,
}

/// Checks and installs the host prerequisites
pub struct PrerequisiteChecker {
    host: HostPlatform,
    mode: ConsentMode,
    probe: Box<dyn HostProbe>,
    prompt: Box<dyn ConsentPrompt>,
    prerequisites: Vec<Box<dyn Prerequisite>>,
}

impl PrerequisiteChecker {
    /// Checker for `host` with its default prerequisite table
    pub fn new(host: HostPlatform, mode: ConsentMode) -> Self {
        let prerequisites = required_prerequisites(&host);
        Self {
            host,
            mode,
            probe: Box::new(SystemProbe),
            prompt: Box::new(StdinPrompt),
            prerequisites,
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn HostProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn ConsentPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Replace the prerequisite table
    pub fn with_prerequisites(mut self, prerequisites: Vec<Box<dyn Prerequisite>>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn prerequisites(&self) -> &[Box<dyn Prerequisite>] {
        &self.prerequisites
    }

    /// Check every prerequisite, installing what can be installed
    ///
    /// Fails with [`Error::PrerequisitesMissing`] when a mandatory
    /// prerequisite is still unmet at the end.
    pub fn run(&self) -> Result<PrerequisiteReport> {
        if let HostPlatform::Unsupported(name) = &self.host {
            return Err(Error::UnsupportedHost {
                requested: "prerequisites".to_string(),
                host: name.clone(),
            });
        }

        let probe = self.probe.as_ref();
        let mut report = PrerequisiteReport::default();
        let mut missing = Vec::new();

        for prerequisite in &self.prerequisites {
            let name = prerequisite.name();
            if prerequisite.check(&self.host, probe) {
                info!("Prerequisite {} is met", name);
                report.met.push(name.to_string());
            } else if self.try_install(prerequisite.as_ref()) {
                report.installed.push(name.to_string());
            } else if prerequisite.mandatory(&self.host) {
                error!("Prerequisite {} is not met", name);
                if let Some(help) = prerequisite.helper(&self.host) {
                    error!("{}", help);
                }
                missing.push(name.to_string());
                continue;
            } else {
                warn!("Prerequisite {} is not met", name);
                if let Some(help) = prerequisite.helper(&self.host) {
                    warn!("{}", help);
                }
                report.missing_optional.push(name.to_string());
                continue;
            }

            if let Some(location) = prerequisite.pkg_config_location(&self.host, probe) {
                report.pkg_config_paths.push(location);
            }
        }

        if missing.is_empty() {
            Ok(report)
        } else {
            Err(Error::PrerequisitesMissing { missing })
        }
    }

    /// Offer to install a missing prerequisite; true when it is now present
    fn try_install(&self, prerequisite: &dyn Prerequisite) -> bool {
        let name = prerequisite.name();
        if !prerequisite.installer_supported(&self.host) {
            return false;
        }

        if let Some(help) = prerequisite.helper(&self.host) {
            info!("{}", help);
        }
        let consent = match self.mode {
            ConsentMode::Unattended => {
                info!("Session is not interactive, installing {} without asking", name);
                true
            }
            ConsentMode::Interactive => self.prompt.confirm(name),
        };
        if !consent {
            info!("Skipping installation of {}", name);
            return false;
        }

        info!("Installing {}", name);
        if let Err(e) = prerequisite.install(&self.host, self.probe.as_ref()) {
            error!("{}", e);
            return false;
        }

        let present = prerequisite.check(&self.host, self.probe.as_ref());
        if !present {
            warn!("{} still not detected after installation", name);
        }
        present
    }
}

/// Run the checker unless the skip flag is set
///
/// Returns `None` when checks were skipped.
pub fn check_prerequisites(
    checker: &PrerequisiteChecker,
    flags: &EnvFlags,
) -> Result<Option<PrerequisiteReport>> {
    if flags.skip_prerequisites {
        info!(
            "{} is set, skipping prerequisite checks",
            EnvFlags::SKIP_PREREQUISITES
        );
        return Ok(None);
    }
    checker.run().map(Some)
}
