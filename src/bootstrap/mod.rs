// src/bootstrap/mod.rs

//! Bootstraps and distribution assembly
//!
//! A bootstrap is the application template the distribution is built for.
//! It decides which extra recipes the build needs (a webview app needs the
//! generic NDK glue, an SDL2 app needs SDL2) and, once every recipe is
//! cooked, the [`Assembler`] lays the collected libraries out in the
//! distribution directory:
//!
//! ```text
//! <dist>/
//!   libs/<arch>/...                  collected shared libraries
//!   libs-stripped/<arch>/...         same, run through llvm-strip
//!   _python_bundle__<arch>/_python_bundle/
//!   dist_info.json
//! ```

use crate::context::{Architecture, BuildContext};
use crate::error::{Error, Result};
use crate::process::ToolRunner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the metadata file in a distribution
pub const DIST_INFO_FILE: &str = "dist_info.json";

/// Application template a distribution targets
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BootstrapKind {
    Sdl2,
    Webview,
    ServiceOnly,
    #[default]
    ServiceLibrary,
}

impl BootstrapKind {
    /// Recipes every build for this bootstrap needs
    pub fn recipe_depends(&self) -> &'static [&'static str] {
        match self {
            Self::Sdl2 => &["sdl2"],
            Self::Webview | Self::ServiceOnly => &["genericndkbuild"],
            Self::ServiceLibrary => &[],
        }
    }
}

/// Distribution metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistInfo {
    pub dist_name: String,
    pub bootstrap: BootstrapKind,
    pub android_api: u32,
    pub ndk_api: u32,
    pub ndk_version: String,
    /// Resolved build order
    pub recipes: Vec<String>,
    /// Architecture -> library paths relative to `libs/<arch>`
    pub archs: BTreeMap<String, Vec<String>>,
    pub updated_at: String,
}

impl DistInfo {
    /// Read `dist_info.json` from a distribution directory
    pub fn load(dist_dir: &Path) -> Result<Option<Self>> {
        let path = dist_dir.join(DIST_INFO_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let info = serde_json::from_str(&content)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?;
        Ok(Some(info))
    }
}

/// Lays out the distribution for one architecture at a time
#[derive(Debug, Clone)]
pub struct Assembler {
    runner: ToolRunner,
    strip: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(ToolRunner::new(Duration::from_secs(600), false))
    }
}

impl Assembler {
    /// An assembler that does not strip
    pub fn new(runner: ToolRunner) -> Self {
        Self {
            runner,
            strip: false,
        }
    }

    /// Also produce `libs-stripped/<arch>` with `llvm-strip --strip-unneeded`
    pub fn with_strip(mut self, strip: bool) -> Self {
        self.strip = strip;
        self
    }

    /// Assemble the distribution for `arch`, returning the distribution path
    pub fn assemble(&self, ctx: &BuildContext, arch: &Architecture) -> Result<PathBuf> {
        let dist_dir = ctx.layout().dist_dir.clone();
        let libs_src = ctx.libs_dir(arch);
        info!("Assembling {} for {} in {}", ctx.bootstrap(), arch, dist_dir.display());

        let libs_dest = dist_dir.join("libs").join(&arch.name);
        if libs_dest.exists() {
            fs::remove_dir_all(&libs_dest)?;
        }
        fs::create_dir_all(&libs_dest)?;

        let mut collected = Vec::new();
        if libs_src.is_dir() {
            for entry in WalkDir::new(&libs_src).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::IoError(format!("Failed to walk {}: {}", libs_src.display(), e)))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&libs_src)
                    .map_err(|e| Error::IoError(e.to_string()))?;
                let dest = libs_dest.join(relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &dest)?;

                if let Some(found) = elf_machine(&dest)?
                    && found != arch.elf_machine()
                {
                    warn!(
                        "{} is built for ELF machine {} but {} expects {}",
                        relative.display(),
                        found,
                        arch,
                        arch.elf_machine()
                    );
                }
                collected.push(relative.to_path_buf());
            }
        } else {
            warn!("No libraries were collected for {}", arch);
        }
        debug!("Copied {} files into {}", collected.len(), libs_dest.display());

        if self.strip {
            self.strip_libraries(arch, &libs_dest, &dist_dir, &collected)?;
        }

        let bundle = dist_dir
            .join(format!("_python_bundle__{}", arch.name))
            .join("_python_bundle");
        fs::create_dir_all(&bundle)?;

        self.write_dist_info(ctx, arch, &dist_dir, &collected)?;
        Ok(dist_dir)
    }

    fn strip_libraries(
        &self,
        arch: &Architecture,
        libs_dest: &Path,
        dist_dir: &Path,
        collected: &[PathBuf],
    ) -> Result<()> {
        let stripped_dir = dist_dir.join("libs-stripped").join(&arch.name);
        if stripped_dir.exists() {
            fs::remove_dir_all(&stripped_dir)?;
        }
        let strip = arch.toolchain().tool("llvm-strip");
        let strip = strip.display().to_string();

        for relative in collected {
            let dest = stripped_dir.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(libs_dest.join(relative), &dest)?;
            if relative.extension().is_some_and(|ext| ext == "so") {
                let target = dest.display().to_string();
                self.runner
                    .run(&strip, &["--strip-unneeded", target.as_str()], dist_dir, &BTreeMap::new())?;
            }
        }
        Ok(())
    }

    fn write_dist_info(
        &self,
        ctx: &BuildContext,
        arch: &Architecture,
        dist_dir: &Path,
        collected: &[PathBuf],
    ) -> Result<()> {
        // Other architectures may already have been assembled
        let mut info = DistInfo::load(dist_dir)?.unwrap_or_default();
        info.dist_name = ctx
            .layout()
            .dist_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info.bootstrap = ctx.bootstrap();
        info.android_api = ctx.android_api();
        info.ndk_api = ctx.ndk_api();
        info.ndk_version = ctx.toolchain().ndk_version.clone();
        info.recipes = ctx
            .build_order()
            .map(|o| o.recipes().to_vec())
            .unwrap_or_default();
        info.archs.insert(
            arch.name.clone(),
            collected
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
        );
        info.updated_at = chrono::Utc::now().to_rfc3339();

        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| Error::IoError(format!("Failed to serialize {}: {}", DIST_INFO_FILE, e)))?;
        fs::write(dist_dir.join(DIST_INFO_FILE), content)?;
        Ok(())
    }
}

/// Assemble the distribution for one architecture without stripping
pub fn assemble(ctx: &BuildContext, arch: &Architecture) -> Result<PathBuf> {
    Assembler::default().assemble(ctx, arch)
}

/// ELF machine of a file, or `None` when it is not an ELF object
pub fn elf_machine(path: &Path) -> Result<Option<u16>> {
    let content = fs::read(path)?;
    if !content.starts_with(b"\x7fELF") {
        return Ok(None);
    }
    match goblin::elf::Elf::parse_header(&content) {
        Ok(header) => Ok(Some(header.e_machine)),
        Err(e) => {
            debug!("Ignoring unparsable ELF header in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}
