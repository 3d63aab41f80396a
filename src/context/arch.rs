// src/context/arch.rs

//! Target architectures
//!
//! Every supported Android ABI has a static [`ArchProfile`]; an
//! [`Architecture`] is a profile bound to the NDK toolchain and API level of
//! one build.

use super::toolchain::NdkToolchain;
use crate::error::{Error, Result};
use std::path::PathBuf;

// ELF e_machine values
const EM_386: u16 = 3;
const EM_ARM: u16 = 40;
const EM_X86_64: u16 = 62;
const EM_AARCH64: u16 = 183;

/// Static per-ABI data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchProfile {
    /// Android ABI name
    pub abi: &'static str,
    /// GNU-style host triple passed to configure scripts
    pub command_prefix: &'static str,
    /// Clang target without the API suffix
    pub clang_target: &'static str,
    /// Directory name under `sysroot/usr/lib`
    pub sysroot_triple: &'static str,
    pub cflags: &'static [&'static str],
    pub elf_machine: u16,
}

pub const ARCH_PROFILES: &[ArchProfile] = &[
    ArchProfile {
        abi: "armeabi-v7a",
        command_prefix: "arm-linux-androideabi",
        clang_target: "armv7a-linux-androideabi",
        sysroot_triple: "arm-linux-androideabi",
        cflags: &["-march=armv7-a", "-mfloat-abi=softfp", "-mfpu=vfp", "-mthumb", "-fPIC"],
        elf_machine: EM_ARM,
    },
    ArchProfile {
        abi: "arm64-v8a",
        command_prefix: "aarch64-linux-android",
        clang_target: "aarch64-linux-android",
        sysroot_triple: "aarch64-linux-android",
        cflags: &["-march=armv8-a", "-fPIC"],
        elf_machine: EM_AARCH64,
    },
    ArchProfile {
        abi: "x86",
        command_prefix: "i686-linux-android",
        clang_target: "i686-linux-android",
        sysroot_triple: "i686-linux-android",
        cflags: &["-march=i686", "-mssse3", "-mfpmath=sse", "-m32", "-fPIC"],
        elf_machine: EM_386,
    },
    ArchProfile {
        abi: "x86_64",
        command_prefix: "x86_64-linux-android",
        clang_target: "x86_64-linux-android",
        sysroot_triple: "x86_64-linux-android",
        cflags: &["-march=x86-64", "-msse4.2", "-mpopcnt", "-m64", "-fPIC"],
        elf_machine: EM_X86_64,
    },
];

/// Look up the profile for an ABI name
pub fn profile(abi: &str) -> Option<&'static ArchProfile> {
    ARCH_PROFILES.iter().find(|p| p.abi == abi)
}

/// One target architecture of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    /// Android ABI name, e.g. "arm64-v8a"
    pub name: String,
    pub profile: &'static ArchProfile,
    /// Minimum API the binaries are compiled against
    pub ndk_api: u32,
    toolchain: NdkToolchain,
}

impl Architecture {
    /// Bind the profile for `abi` to a toolchain
    pub fn new(abi: &str, toolchain: &NdkToolchain, ndk_api: u32) -> Result<Self> {
        let profile = profile(abi).ok_or_else(|| Error::UnknownArch(abi.to_string()))?;
        Ok(Self {
            name: abi.to_string(),
            profile,
            ndk_api,
            toolchain: toolchain.clone(),
        })
    }

    pub fn command_prefix(&self) -> &'static str {
        self.profile.command_prefix
    }

    /// Full clang target including the API level
    pub fn target(&self) -> String {
        format!("{}{}", self.profile.clang_target, self.ndk_api)
    }

    pub fn cc(&self) -> PathBuf {
        self.toolchain.clang(self.profile.clang_target, self.ndk_api)
    }

    pub fn cxx(&self) -> PathBuf {
        self.toolchain.clangxx(self.profile.clang_target, self.ndk_api)
    }

    pub fn toolchain(&self) -> &NdkToolchain {
        &self.toolchain
    }

    /// Architecture-specific compiler flags
    pub fn cflags(&self) -> Vec<String> {
        self.profile.cflags.iter().map(|f| f.to_string()).collect()
    }

    /// Library directory for this target inside the NDK sysroot
    pub fn sysroot_lib_dir(&self) -> PathBuf {
        self.toolchain
            .sysroot()
            .join("usr/lib")
            .join(self.profile.sysroot_triple)
            .join(self.ndk_api.to_string())
    }

    /// Header directories for this target inside the NDK sysroot
    pub fn sysroot_include_dirs(&self) -> Vec<PathBuf> {
        let include = self.toolchain.sysroot().join("usr/include");
        vec![include.join(self.profile.sysroot_triple), include]
    }

    /// ELF machine type expected for libraries built for this architecture
    pub fn elf_machine(&self) -> u16 {
        self.profile.elf_machine
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
