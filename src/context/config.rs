// src/context/config.rs

//! Build configuration
//!
//! Settings come from three places, in increasing precedence: the
//! `crossbake.toml` file, CLI flags applied through the `with_*` setters,
//! and the environment flags read once into [`EnvFlags`].

use crate::bootstrap::BootstrapKind;
use crate::error::{Error, Result};
use crate::recipe::kitchen::KitchenConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Recommended defaults for API levels
pub const DEFAULT_ANDROID_API: u32 = 33;
pub const DEFAULT_NDK_API: u32 = 24;
/// Oldest API level the NDK toolchains still target
pub const MIN_NDK_API: u32 = 21;

/// Configuration for a build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// ABIs to build, in order
    pub archs: Vec<String>,
    /// Target Android API level
    pub android_api: u32,
    /// Minimum API level compiled against
    pub ndk_api: u32,
    /// NDK root; falls back to ANDROID_NDK_HOME
    pub ndk_dir: Option<PathBuf>,
    /// NDK release ("28c"); read from the NDK when absent
    pub ndk_version: Option<String>,
    /// Root for the package cache, build trees and distributions
    pub storage_dir: PathBuf,
    /// Name of the distribution being produced
    pub dist_name: String,
    pub bootstrap: BootstrapKind,
    /// Recipes requested for the build
    pub requirements: Vec<String>,
    /// Directories holding `*.toml` recipe manifests; later ones override
    pub recipe_dirs: Vec<PathBuf>,
    pub kitchen: KitchenConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            archs: vec!["arm64-v8a".to_string(), "armeabi-v7a".to_string()],
            android_api: DEFAULT_ANDROID_API,
            ndk_api: DEFAULT_NDK_API,
            ndk_dir: None,
            ndk_version: None,
            storage_dir: default_storage_dir(),
            dist_name: "default".to_string(),
            bootstrap: BootstrapKind::default(),
            requirements: Vec::new(),
            recipe_dirs: Vec::new(),
            kitchen: KitchenConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file
    ///
    /// Relative recipe directories are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?;

        if let Some(base) = path.parent() {
            for dir in &mut config.recipe_dirs {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        Ok(config)
    }

    /// Fill unset values from environment variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.ndk_dir.is_none() {
            self.ndk_dir = lookup("ANDROID_NDK_HOME")
                .or_else(|| lookup("ANDROID_NDK_ROOT"))
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
        }
    }

    /// Check values that can be checked without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.archs.is_empty() {
            return Err(Error::ConfigError("no target architectures configured".to_string()));
        }
        for (i, arch) in self.archs.iter().enumerate() {
            if self.archs[..i].contains(arch) {
                return Err(Error::ConfigError(format!(
                    "architecture {arch} is listed twice"
                )));
            }
        }
        if self.ndk_api > self.android_api {
            return Err(Error::ConfigError(format!(
                "ndk_api ({}) is higher than android_api ({}); binaries would not load on the target",
                self.ndk_api, self.android_api
            )));
        }
        if self.ndk_api < MIN_NDK_API {
            return Err(Error::ConfigError(format!(
                "ndk_api {} is below the minimum supported level {}",
                self.ndk_api, MIN_NDK_API
            )));
        }
        if self.dist_name.is_empty() || self.dist_name.contains(['/', '\\']) {
            return Err(Error::ConfigError(format!(
                "invalid distribution name '{}'",
                self.dist_name
            )));
        }
        Ok(())
    }

    /// Set the target architectures
    pub fn with_archs<I, S>(mut self, archs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archs = archs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the target Android API
    pub fn with_android_api(mut self, api: u32) -> Self {
        self.android_api = api;
        self
    }

    /// Set the minimum NDK API
    pub fn with_ndk_api(mut self, api: u32) -> Self {
        self.ndk_api = api;
        self
    }

    /// Use an NDK with a known release
    pub fn with_ndk(mut self, dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        self.ndk_dir = Some(dir.into());
        self.ndk_version = Some(version.into());
        self
    }

    /// Set the storage root
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Set the distribution name
    pub fn with_dist_name(mut self, name: impl Into<String>) -> Self {
        self.dist_name = name.into();
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapKind) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the requested recipes
    pub fn with_requirements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add a recipe directory
    pub fn with_recipe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recipe_dirs.push(dir.into());
        self
    }

    pub fn with_kitchen(mut self, kitchen: KitchenConfig) -> Self {
        self.kitchen = kitchen;
        self
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("crossbake"))
        .unwrap_or_else(|| PathBuf::from(".crossbake"))
}

/// Flags read from the process environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvFlags {
    /// CROSSBAKE_SKIP_PREREQUISITES=1
    pub skip_prerequisites: bool,
    /// CROSSBAKE_PREREQUISITES_INSTALL_INTERACTIVE, on unless set to 0
    pub interactive_install: bool,
    /// CROSSBAKE_FULL_LOG=1
    pub full_log: bool,
}

impl Default for EnvFlags {
    fn default() -> Self {
        Self {
            skip_prerequisites: false,
            interactive_install: true,
            full_log: false,
        }
    }
}

impl EnvFlags {
    pub const SKIP_PREREQUISITES: &'static str = "CROSSBAKE_SKIP_PREREQUISITES";
    pub const INSTALL_INTERACTIVE: &'static str = "CROSSBAKE_PREREQUISITES_INSTALL_INTERACTIVE";
    pub const FULL_LOG: &'static str = "CROSSBAKE_FULL_LOG";

    /// Read the flags from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the flags through an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v.trim().to_string());
        Self {
            skip_prerequisites: flag(Self::SKIP_PREREQUISITES).is_some_and(|v| v == "1"),
            interactive_install: flag(Self::INSTALL_INTERACTIVE).is_none_or(|v| v != "0"),
            full_log: flag(Self::FULL_LOG).is_some_and(|v| v == "1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.archs, vec!["arm64-v8a", "armeabi-v7a"]);
        assert_eq!(config.android_api, 33);
        assert_eq!(config.ndk_api, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BuildConfig::new()
            .with_archs(["x86_64"])
            .with_android_api(30)
            .with_ndk_api(21)
            .with_ndk("/opt/ndk", "28c")
            .with_requirements(["sqlite3", "apsw"])
            .with_dist_name("demo");

        assert_eq!(config.archs, vec!["x86_64"]);
        assert_eq!(config.ndk_dir, Some(PathBuf::from("/opt/ndk")));
        assert_eq!(config.ndk_version.as_deref(), Some("28c"));
        assert_eq!(config.requirements, vec!["sqlite3", "apsw"]);
        assert_eq!(config.dist_name, "demo");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BuildConfig::new().with_archs(Vec::<String>::new()).validate().is_err());
        assert!(BuildConfig::new().with_archs(["x86", "x86"]).validate().is_err());
        assert!(BuildConfig::new().with_android_api(23).with_ndk_api(24).validate().is_err());
        assert!(BuildConfig::new().with_ndk_api(19).validate().is_err());
        assert!(BuildConfig::new().with_dist_name("a/b").validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crossbake.toml");
        fs::write(
            &path,
            r#"
archs = ["arm64-v8a"]
android_api = 34
requirements = ["sqlite3"]
recipe_dirs = ["recipes"]
bootstrap = "webview"

[kitchen]
fetch_retries = 5
"#,
        )
        .unwrap();

        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.archs, vec!["arm64-v8a"]);
        assert_eq!(config.android_api, 34);
        assert_eq!(config.ndk_api, DEFAULT_NDK_API);
        assert_eq!(config.recipe_dirs, vec![dir.path().join("recipes")]);
        assert_eq!(config.bootstrap, BootstrapKind::Webview);
        assert_eq!(config.kitchen.fetch_retries, 5);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crossbake.toml");
        fs::write(&path, "archs = \"not a list\"").unwrap();
        assert!(matches!(BuildConfig::load(&path), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_apply_env() {
        let mut config = BuildConfig::new();
        config.apply_env(lookup(&[("ANDROID_NDK_ROOT", "/sdk/ndk/28.2")]));
        assert_eq!(config.ndk_dir, Some(PathBuf::from("/sdk/ndk/28.2")));

        // An explicit setting wins
        let mut config = BuildConfig::new().with_ndk("/opt/ndk", "28c");
        config.apply_env(lookup(&[("ANDROID_NDK_HOME", "/elsewhere")]));
        assert_eq!(config.ndk_dir, Some(PathBuf::from("/opt/ndk")));
    }

    #[test]
    fn test_env_flags() {
        assert_eq!(EnvFlags::from_lookup(lookup(&[])), EnvFlags::default());

        let flags = EnvFlags::from_lookup(lookup(&[
            (EnvFlags::SKIP_PREREQUISITES, "1"),
            (EnvFlags::INSTALL_INTERACTIVE, "0"),
            (EnvFlags::FULL_LOG, "1"),
        ]));
        assert!(flags.skip_prerequisites);
        assert!(!flags.interactive_install);
        assert!(flags.full_log);

        let flags = EnvFlags::from_lookup(lookup(&[(EnvFlags::SKIP_PREREQUISITES, "yes")]));
        assert!(!flags.skip_prerequisites);
        assert!(flags.interactive_install);
    }
}
