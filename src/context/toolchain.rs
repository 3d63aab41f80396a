// src/context/toolchain.rs

//! Android NDK toolchain representation
//!
//! Modern NDKs ship a single LLVM toolchain per host under
//! `toolchains/llvm/prebuilt/<host-tag>`, with per-target clang wrappers
//! named `<target><api>-clang`. This module resolves those paths and reads
//! the NDK release from `source.properties`.

use super::HostPlatform;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// The NDK toolchain used for every architecture of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdkToolchain {
    /// NDK root directory
    pub ndk_dir: PathBuf,
    /// Release name in letter form, e.g. "28c"
    pub ndk_version: String,
    /// Prebuilt host directory name, e.g. "linux-x86_64"
    pub host_tag: String,
}

impl NdkToolchain {
    /// Describe an NDK at `ndk_dir`
    pub fn new(ndk_dir: impl Into<PathBuf>, ndk_version: impl Into<String>, host: &HostPlatform) -> Self {
        let host_tag = match host {
            HostPlatform::Darwin => "darwin-x86_64",
            HostPlatform::Windows => "windows-x86_64",
            _ => "linux-x86_64",
        };
        Self {
            ndk_dir: ndk_dir.into(),
            ndk_version: ndk_version.into(),
            host_tag: host_tag.to_string(),
        }
    }

    /// Read the NDK release from `source.properties`
    ///
    /// `Pkg.Revision = 28.2.13676358` becomes "28c".
    pub fn detect_version(ndk_dir: &Path) -> Result<String> {
        let props = ndk_dir.join("source.properties");
        let content = fs::read_to_string(&props).map_err(|e| {
            Error::ConfigError(format!(
                "cannot read NDK version from {}: {}",
                props.display(),
                e
            ))
        })?;

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.trim() == "Pkg.Revision" {
                return letter_version(value.trim()).ok_or_else(|| {
                    Error::ConfigError(format!("unrecognised NDK revision '{}'", value.trim()))
                });
            }
        }

        Err(Error::ConfigError(format!(
            "no Pkg.Revision entry in {}",
            props.display()
        )))
    }

    /// Root of the prebuilt LLVM toolchain
    pub fn llvm_prefix(&self) -> PathBuf {
        self.ndk_dir
            .join("toolchains/llvm/prebuilt")
            .join(&self.host_tag)
    }

    /// Directory containing the toolchain binaries
    pub fn bin_dir(&self) -> PathBuf {
        self.llvm_prefix().join("bin")
    }

    /// Unified sysroot shared by every target
    pub fn sysroot(&self) -> PathBuf {
        self.llvm_prefix().join("sysroot")
    }

    /// Path to a target-independent tool (e.g., "llvm-ar")
    pub fn tool(&self, name: &str) -> PathBuf {
        self.bin_dir().join(name)
    }

    /// Path to the clang wrapper for a target at an API level
    pub fn clang(&self, target: &str, api: u32) -> PathBuf {
        self.tool(&format!("{target}{api}-clang"))
    }

    /// Path to the clang++ wrapper for a target at an API level
    pub fn clangxx(&self, target: &str, api: u32) -> PathBuf {
        self.tool(&format!("{target}{api}-clang++"))
    }

    /// CMake toolchain file shipped with the NDK
    pub fn cmake_toolchain_file(&self) -> PathBuf {
        self.ndk_dir.join("build/cmake/android.toolchain.cmake")
    }

    /// Verify the toolchain directory layout exists
    pub fn verify(&self) -> Result<()> {
        let bin = self.bin_dir();
        if !bin.is_dir() {
            return Err(Error::ConfigError(format!(
                "NDK toolchain not found at {} (is {} an NDK r23 or newer?)",
                bin.display(),
                self.ndk_dir.display()
            )));
        }
        Ok(())
    }
}

fn letter_version(revision: &str) -> Option<String> {
    let mut parts = revision.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().unwrap_or("0").parse().ok()?;
    if minor > 25 {
        return None;
    }
    if minor == 0 {
        Some(major.to_string())
    } else {
        let letter = (b'a' + minor as u8) as char;
        Some(format!("{major}{letter}"))
    }
}
