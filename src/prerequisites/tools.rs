// src/prerequisites/tools.rs

//! The prerequisite table

use super::{HostProbe, Prerequisite};
use crate::context::HostPlatform;
use crate::error::{Error, Result};
use std::path::PathBuf;

/// Prerequisites that apply to `host`, in check order
///
/// On macOS everything is mandatory and installed through Homebrew, so
/// Homebrew itself comes first. Linux hosts have no table: the build tools
/// come from distribution packages and are left to the user.
pub fn required_prerequisites(host: &HostPlatform) -> Vec<Box<dyn Prerequisite>> {
    match host {
        HostPlatform::Darwin => vec![
            Box::new(Homebrew),
            Box::new(BrewTool::new("autoconf", "autoconf")),
            Box::new(BrewTool::new("automake", "automake")),
            Box::new(BrewTool::new("libtool", "libtool")),
            Box::new(BrewTool::new("pkg-config", "pkg-config")),
            Box::new(BrewTool::new("cmake", "cmake")),
            Box::new(BrewTool::new("openssl", "openssl@3").with_pkg_config()),
            Box::new(Jdk),
        ],
        HostPlatform::Linux | HostPlatform::Windows | HostPlatform::Unsupported(_) => Vec::new(),
    }
}

/// Location of an installed Homebrew formula
fn brew_prefix(probe: &dyn HostProbe, formula: &str) -> Option<PathBuf> {
    probe
        .output("brew", &["--prefix", formula, "--installed"])
        .map(PathBuf::from)
}

/// The Homebrew package manager
#[derive(Debug, Clone, Copy, Default)]
pub struct Homebrew;

impl Prerequisite for Homebrew {
    fn name(&self) -> &str {
        "homebrew"
    }

    fn mandatory(&self, host: &HostPlatform) -> bool {
        *host == HostPlatform::Darwin
    }

    fn installer_supported(&self, _host: &HostPlatform) -> bool {
        false
    }

    fn check(&self, _host: &HostPlatform, probe: &dyn HostProbe) -> bool {
        probe.find_program("brew").is_some()
    }

    fn helper(&self, host: &HostPlatform) -> Option<String> {
        (*host == HostPlatform::Darwin).then(|| {
            "Installer for homebrew is not yet supported on macOS, \
             the installation process is easy though! \
             See: https://brew.sh for further instructions."
                .to_string()
        })
    }
}

/// A build tool installable as a Homebrew formula
#[derive(Debug, Clone)]
pub struct BrewTool {
    name: &'static str,
    formula: &'static str,
    pkg_config: bool,
}

impl BrewTool {
    pub fn new(name: &'static str, formula: &'static str) -> Self {
        Self {
            name,
            formula,
            pkg_config: false,
        }
    }

    /// The formula ships `.pc` files under `<prefix>/lib/pkgconfig`
    pub fn with_pkg_config(mut self) -> Self {
        self.pkg_config = true;
        self
    }

    pub fn formula(&self) -> &str {
        self.formula
    }
}

impl Prerequisite for BrewTool {
    fn name(&self) -> &str {
        self.name
    }

    fn mandatory(&self, host: &HostPlatform) -> bool {
        *host == HostPlatform::Darwin
    }

    fn installer_supported(&self, host: &HostPlatform) -> bool {
        *host == HostPlatform::Darwin
    }

    fn check(&self, host: &HostPlatform, probe: &dyn HostProbe) -> bool {
        *host == HostPlatform::Darwin && brew_prefix(probe, self.formula).is_some()
    }

    fn install(&self, host: &HostPlatform, probe: &dyn HostProbe) -> Result<()> {
        if *host != HostPlatform::Darwin {
            return Err(Error::InstallFailed {
                name: self.name.to_string(),
                reason: format!("no installer on {host}"),
            });
        }
        probe
            .run("brew", &["install", self.formula])
            .map_err(|e| Error::InstallFailed {
                name: self.name.to_string(),
                reason: e.to_string(),
            })
    }

    fn helper(&self, host: &HostPlatform) -> Option<String> {
        (*host == HostPlatform::Darwin)
            .then(|| format!("{} can be installed with: brew install {}", self.name, self.formula))
    }

    fn pkg_config_location(&self, host: &HostPlatform, probe: &dyn HostProbe) -> Option<PathBuf> {
        if !self.pkg_config || *host != HostPlatform::Darwin {
            return None;
        }
        brew_prefix(probe, self.formula).map(|prefix| prefix.join("lib").join("pkgconfig"))
    }
}

/// JDK 17, needed to compile the Java side of the bootstraps
#[derive(Debug, Clone, Copy, Default)]
pub struct Jdk;

impl Jdk {
    const FORMULA: &'static str = "openjdk@17";
}

impl Prerequisite for Jdk {
    fn name(&self) -> &str {
        "jdk17"
    }

    fn mandatory(&self, host: &HostPlatform) -> bool {
        *host == HostPlatform::Darwin
    }

    fn installer_supported(&self, host: &HostPlatform) -> bool {
        *host == HostPlatform::Darwin
    }

    fn check(&self, host: &HostPlatform, probe: &dyn HostProbe) -> bool {
        *host == HostPlatform::Darwin
            && (probe.output("/usr/libexec/java_home", &["-v", "17"]).is_some()
                || brew_prefix(probe, Self::FORMULA).is_some())
    }

    fn install(&self, host: &HostPlatform, probe: &dyn HostProbe) -> Result<()> {
        if *host != HostPlatform::Darwin {
            return Err(Error::InstallFailed {
                name: self.name().to_string(),
                reason: format!("no installer on {host}"),
            });
        }
        probe
            .run("brew", &["install", Self::FORMULA])
            .map_err(|e| Error::InstallFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })
    }

    fn helper(&self, host: &HostPlatform) -> Option<String> {
        (*host == HostPlatform::Darwin)
            .then(|| format!("JDK 17 can be installed with: brew install {}", Self::FORMULA))
    }
}
