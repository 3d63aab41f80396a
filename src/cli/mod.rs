// src/cli/mod.rs
//! CLI definitions for crossbake
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crossbake")]
#[command(author, version, about = "Cross-compile recipes for Android ABIs", long_about = None)]
pub struct Cli {
    /// Config file (default: ./crossbake.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check prerequisites, resolve, cook every architecture and assemble
    Build {
        #[command(flatten)]
        target: TargetArgs,

        /// Rebuild recipes even when their artifacts are up to date
        #[arg(long)]
        force: bool,

        /// Parallel make jobs per build
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Do not produce the stripped library variant
        #[arg(long)]
        no_strip: bool,
    },

    /// Print the resolved build order
    Order {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the order and chosen edges as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the environment a recipe would be built with
    Env {
        /// Recipe to show (for the first --arch, or the first configured one)
        recipe: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Check host prerequisites only
    Check,

    /// List the known recipes
    Recipes {
        /// Extra recipe directories
        #[arg(long = "recipes")]
        recipe_dirs: Vec<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options describing what to build and for which targets
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Recipes to build (adds to the configured requirements)
    pub requirements: Vec<String>,

    /// Target ABI; may be repeated
    #[arg(long = "arch")]
    pub archs: Vec<String>,

    /// Android NDK root
    #[arg(long)]
    pub ndk_dir: Option<PathBuf>,

    /// Target Android API level
    #[arg(long)]
    pub android_api: Option<u32>,

    /// Minimum API level to compile against
    #[arg(long)]
    pub ndk_api: Option<u32>,

    /// Storage root for caches, build trees and distributions
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Distribution name
    #[arg(long)]
    pub dist_name: Option<String>,

    /// Bootstrap: sdl2, webview, service_only or service_library
    #[arg(long)]
    pub bootstrap: Option<String>,

    /// Extra recipe directories; later ones override earlier ones
    #[arg(long = "recipes")]
    pub recipe_dirs: Vec<PathBuf>,
}
