// src/commands/mod.rs

//! Command implementations

mod build;
mod check;
mod inspect;

pub use build::cmd_build;
pub use check::cmd_check;
pub use inspect::{cmd_env, cmd_order, cmd_recipes};

use crate::cli::TargetArgs;
use anyhow::{Context, Result};
use crossbake::recipe::load_registry;
use crossbake::{BootstrapKind, BuildConfig, BuildContext, RecipeRegistry};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory
const DEFAULT_CONFIG: &str = "crossbake.toml";
/// Recipe directory picked up from the working directory
const DEFAULT_RECIPE_DIR: &str = "recipes";

/// Load the config file, then layer environment and command-line values
pub(crate) fn load_config(path: Option<&Path>, target: &TargetArgs) -> Result<BuildConfig> {
    let mut config = match path {
        Some(path) => BuildConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            debug!("Using ./{}", DEFAULT_CONFIG);
            BuildConfig::load(Path::new(DEFAULT_CONFIG))?
        }
        None => BuildConfig::default(),
    };

    if let Some(dir) = &target.ndk_dir {
        config.ndk_dir = Some(dir.clone());
        config.ndk_version = None;
    }
    config.apply_env(|key| std::env::var(key).ok());

    if !target.archs.is_empty() {
        config.archs = target.archs.clone();
    }
    if let Some(api) = target.android_api {
        config.android_api = api;
    }
    if let Some(api) = target.ndk_api {
        config.ndk_api = api;
    }
    if let Some(dir) = &target.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(name) = &target.dist_name {
        config.dist_name = name.clone();
    }
    if let Some(kind) = &target.bootstrap {
        config.bootstrap = kind
            .parse::<BootstrapKind>()
            .map_err(|_| anyhow::anyhow!("Unknown bootstrap '{}'", kind))?;
    }
    for name in &target.requirements {
        if !config.requirements.contains(name) {
            config.requirements.push(name.clone());
        }
    }
    config.recipe_dirs.extend(target.recipe_dirs.iter().cloned());
    if config.recipe_dirs.is_empty() && Path::new(DEFAULT_RECIPE_DIR).is_dir() {
        config.recipe_dirs.push(PathBuf::from(DEFAULT_RECIPE_DIR));
    }

    Ok(config)
}

/// Load the recipe registry named by the config
pub(crate) fn load_recipes(config: &BuildConfig) -> Result<RecipeRegistry> {
    let registry = load_registry(&config.recipe_dirs).context("Failed to load recipes")?;
    if registry.is_empty() {
        anyhow::bail!(
            "No recipes found; add a recipe directory with --recipes or recipe_dirs in {}",
            DEFAULT_CONFIG
        );
    }
    Ok(registry)
}

/// Build the context with the configured extra PATH entries applied
pub(crate) fn load_context(config: &BuildConfig) -> Result<BuildContext> {
    let registry = load_recipes(config)?;
    let mut ctx = BuildContext::new(config, registry)?;

    if !config.kitchen.extra_path.is_empty() {
        let mut entries = config.kitchen.extra_path.clone();
        entries.extend(std::env::split_paths(ctx.host_path()));
        let joined = std::env::join_paths(entries).context("Invalid extra_path entry")?;
        ctx.set_host_path(joined.to_string_lossy().to_string());
    }
    Ok(ctx)
}
