// src/commands/inspect.rs

//! Order, env and recipes commands - look at a build without running it

use super::{load_config, load_context, load_recipes};
use crate::cli::TargetArgs;
use anyhow::{Context, Result};
use crossbake::EnvironmentComposer;
use std::collections::HashSet;
use std::path::Path;

/// Print the resolved build order
pub fn cmd_order(config_path: Option<&Path>, target: &TargetArgs, json: bool) -> Result<()> {
    let config = load_config(config_path, target)?;
    let mut ctx = load_context(&config)?;
    let order = ctx.resolve()?;

    if json {
        println!("{}", serde_json::to_string_pretty(order)?);
        return Ok(());
    }

    for (i, name) in order.recipes().iter().enumerate() {
        let deps = order.dependencies(name);
        if deps.is_empty() {
            println!("{:>3}. {}", i + 1, name);
        } else {
            println!("{:>3}. {} (after {})", i + 1, name, deps.join(", "));
        }
    }
    Ok(())
}

/// Print the environment for one recipe, as if its dependencies were built
///
/// Shown for the first target architecture.
pub fn cmd_env(
    config_path: Option<&Path>,
    target: &TargetArgs,
    recipe: &str,
) -> Result<()> {
    let mut config = load_config(config_path, target)?;
    if !config.requirements.iter().any(|r| r == recipe) {
        config.requirements.push(recipe.to_string());
    }
    let mut ctx = load_context(&config)?;
    ctx.resolve()?;

    let arch = ctx.archs().first().context("No architectures configured")?;
    let order = ctx
        .build_order()
        .context("Build order was not resolved")?;
    let recipe = ctx.recipe(recipe)?;

    let mut built: HashSet<String> = order.dependencies(&recipe.name).iter().cloned().collect();
    built.extend(order.transitive_dependencies(&recipe.name));

    let env = EnvironmentComposer::new(&ctx, order).compose(recipe, arch, &built);
    for (key, value) in env.vars() {
        println!("{}={}", key, value);
    }
    println!("# fingerprint {}", env.fingerprint());
    Ok(())
}

/// List the known recipes
pub fn cmd_recipes(config_path: Option<&Path>, recipe_dirs: &[std::path::PathBuf]) -> Result<()> {
    let target = TargetArgs {
        recipe_dirs: recipe_dirs.to_vec(),
        ..TargetArgs::default()
    };
    let config = load_config(config_path, &target)?;
    let registry = load_recipes(&config)?;

    for name in registry.names() {
        if let Some(recipe) = registry.get(name) {
            let deps: Vec<String> = recipe.depends.iter().map(ToString::to_string).collect();
            if deps.is_empty() {
                println!("{} {} [{}]", recipe.name, recipe.version, recipe.procedure.family());
            } else {
                println!(
                    "{} {} [{}] depends: {}",
                    recipe.name,
                    recipe.version,
                    recipe.procedure.family(),
                    deps.join(", ")
                );
            }
        }
    }
    Ok(())
}
