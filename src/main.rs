// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Build {
            target,
            force,
            jobs,
            no_strip,
        } => commands::cmd_build(config, &target, force, jobs, no_strip),

        Commands::Order { target, json } => commands::cmd_order(config, &target, json),

        Commands::Env { recipe, target } => commands::cmd_env(config, &target, &recipe),

        Commands::Check => commands::cmd_check(),

        Commands::Recipes { recipe_dirs } => commands::cmd_recipes(config, &recipe_dirs),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "crossbake", &mut std::io::stdout());
            Ok(())
        }
    }
}
