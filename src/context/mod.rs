// src/context/mod.rs

//! Build context
//!
//! The [`BuildContext`] gathers everything a build needs to know before any
//! recipe is cooked: target architectures, toolchain, API levels, directory
//! layout, the recipe registry and, once setup is done, the resolved
//! [`BuildOrder`]. It is constructed once from a [`BuildConfig`], mutated
//! only by [`BuildContext::resolve`], and then shared read-only by every
//! architecture worker (usually behind an `Arc`).

mod arch;
mod config;
mod toolchain;

pub use arch::{ARCH_PROFILES, ArchProfile, Architecture, profile};
pub use config::{BuildConfig, DEFAULT_ANDROID_API, DEFAULT_NDK_API, EnvFlags, MIN_NDK_API};
pub use toolchain::NdkToolchain;

use crate::bootstrap::BootstrapKind;
use crate::error::{Error, Result};
use crate::recipe::resolver::{self, BuildOrder};
use crate::recipe::{Recipe, RecipeRegistry};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Host operating system family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    Darwin,
    Windows,
    /// A host this tool cannot build on
    Unsupported(String),
}

impl HostPlatform {
    /// Platform of the running process
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS name as reported by `std::env::consts::OS`
    pub fn from_os(os: &str) -> Self {
        match os.to_ascii_lowercase().as_str() {
            "linux" => Self::Linux,
            "macos" | "darwin" => Self::Darwin,
            "windows" => Self::Windows,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
            Self::Unsupported(name) => name,
        }
    }

    /// Case-insensitive comparison against a platform family name
    pub fn matches(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(self.name())
            || (*self == Self::Darwin && name.eq_ignore_ascii_case("macos"))
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Directory layout under the storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub storage_dir: PathBuf,
    pub build_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub dist_dir: PathBuf,
    dist_name: String,
}

impl Layout {
    pub fn new(storage_dir: impl Into<PathBuf>, dist_name: &str) -> Self {
        let storage_dir = storage_dir.into();
        Self {
            build_dir: storage_dir.join("build"),
            packages_dir: storage_dir.join("packages"),
            dist_dir: storage_dir.join("dists").join(dist_name),
            dist_name: dist_name.to_string(),
            storage_dir,
        }
    }

    /// `<build>/other_builds/<recipe>`
    pub fn recipe_container_dir(&self, recipe: &str) -> PathBuf {
        self.build_dir.join("other_builds").join(recipe)
    }

    /// `<build>/other_builds/<recipe>/<arch>`, holding the build dir and stamps
    pub fn arch_work_dir(&self, recipe: &str, arch: &str) -> PathBuf {
        self.recipe_container_dir(recipe).join(arch)
    }

    /// `<build>/other_builds/<recipe>/<arch>/<recipe>`
    pub fn recipe_build_dir(&self, recipe: &str, arch: &str) -> PathBuf {
        self.arch_work_dir(recipe, arch).join(recipe)
    }

    /// Collected libraries for one architecture
    pub fn libs_dir(&self, arch: &str) -> PathBuf {
        self.build_dir
            .join("libs_collections")
            .join(&self.dist_name)
            .join(arch)
    }

    /// Download cache for one recipe
    pub fn package_dir(&self, recipe: &str) -> PathBuf {
        self.packages_dir.join(recipe)
    }

    /// Advisory lock file guarding one architecture's build tree
    pub fn lock_file(&self, arch: &str) -> PathBuf {
        self.build_dir.join("locks").join(format!("{arch}.lock"))
    }
}

/// Shared build state
#[derive(Debug)]
pub struct BuildContext {
    archs: Vec<Architecture>,
    layout: Layout,
    toolchain: NdkToolchain,
    android_api: u32,
    ndk_api: u32,
    host: HostPlatform,
    host_path: String,
    bootstrap: BootstrapKind,
    registry: RecipeRegistry,
    requested: Vec<String>,
    build_order: Option<BuildOrder>,
}

impl BuildContext {
    /// Construct the context for the running host
    pub fn new(config: &BuildConfig, registry: RecipeRegistry) -> Result<Self> {
        Self::with_host(config, registry, HostPlatform::detect())
    }

    /// Construct the context for an explicit host platform
    pub fn with_host(config: &BuildConfig, registry: RecipeRegistry, host: HostPlatform) -> Result<Self> {
        config.validate()?;

        let ndk_dir = config.ndk_dir.clone().ok_or_else(|| {
            Error::ConfigError(
                "no Android NDK configured; set ndk_dir in crossbake.toml or ANDROID_NDK_HOME"
                    .to_string(),
            )
        })?;
        let ndk_version = match &config.ndk_version {
            Some(version) => version.clone(),
            None => NdkToolchain::detect_version(&ndk_dir)?,
        };
        let toolchain = NdkToolchain::new(ndk_dir, ndk_version, &host);

        let archs = config
            .archs
            .iter()
            .map(|name| Architecture::new(name, &toolchain, config.ndk_api))
            .collect::<Result<Vec<_>>>()?;

        let mut requested = config.requirements.clone();
        for extra in config.bootstrap.recipe_depends() {
            if !requested.iter().any(|r| r == extra) {
                requested.push(extra.to_string());
            }
        }

        debug!(
            "Build context: host={}, archs={:?}, android_api={}, ndk_api={}, ndk={}",
            host, config.archs, config.android_api, config.ndk_api, toolchain.ndk_version
        );

        Ok(Self {
            archs,
            layout: Layout::new(&config.storage_dir, &config.dist_name),
            toolchain,
            android_api: config.android_api,
            ndk_api: config.ndk_api,
            host,
            host_path: std::env::var("PATH").unwrap_or_default(),
            bootstrap: config.bootstrap,
            registry,
            requested,
            build_order: None,
        })
    }

    /// Resolve the configured requirements into the build order
    pub fn resolve(&mut self) -> Result<&BuildOrder> {
        let requested = self.requested.clone();
        self.resolve_names(requested)
    }

    /// Resolve an explicit list of requested recipes into the build order
    pub fn resolve_requested(&mut self, names: &[&str]) -> Result<&BuildOrder> {
        self.requested = names.iter().map(|n| n.to_string()).collect();
        let requested = self.requested.clone();
        self.resolve_names(requested)
    }

    fn resolve_names(&mut self, requested: Vec<String>) -> Result<&BuildOrder> {
        let order = resolver::resolve(&self.registry, &requested)?;
        info!("Build order: {}", order.recipes().join(", "));
        Ok(self.build_order.insert(order))
    }

    pub fn archs(&self) -> &[Architecture] {
        &self.archs
    }

    pub fn arch(&self, name: &str) -> Option<&Architecture> {
        self.archs.iter().find(|a| a.name == name)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn toolchain(&self) -> &NdkToolchain {
        &self.toolchain
    }

    pub fn android_api(&self) -> u32 {
        self.android_api
    }

    pub fn ndk_api(&self) -> u32 {
        self.ndk_api
    }

    pub fn host(&self) -> &HostPlatform {
        &self.host
    }

    /// Host PATH captured when the context was built
    pub fn host_path(&self) -> &str {
        &self.host_path
    }

    /// Override the captured host PATH
    pub fn set_host_path(&mut self, path: impl Into<String>) {
        self.host_path = path.into();
    }

    pub fn bootstrap(&self) -> BootstrapKind {
        self.bootstrap
    }

    pub fn registry(&self) -> &RecipeRegistry {
        &self.registry
    }

    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Resolved build order, once setup has run
    pub fn build_order(&self) -> Option<&BuildOrder> {
        self.build_order.as_ref()
    }

    /// Whether `name` is part of the resolved build order
    pub fn will_build(&self, name: &str) -> bool {
        self.build_order.as_ref().is_some_and(|o| o.contains(name))
    }

    /// Look up a recipe in the registry
    pub fn recipe(&self, name: &str) -> Result<&Recipe> {
        self.registry
            .get(name)
            .ok_or_else(|| Error::UnknownRecipe(name.to_string()))
    }

    /// Per-arch build directory of a recipe
    pub fn recipe_build_dir(&self, recipe: &str, arch: &Architecture) -> PathBuf {
        self.layout.recipe_build_dir(recipe, &arch.name)
    }

    /// Collected libraries of an architecture
    pub fn libs_dir(&self, arch: &Architecture) -> PathBuf {
        self.layout.libs_dir(&arch.name)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.layout.storage_dir
    }
}
