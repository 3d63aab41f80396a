// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Arguments shared by every command that resolves a build
fn target_args() -> Vec<Arg> {
    vec![
        Arg::new("requirements")
            .num_args(0..)
            .help("Recipes to build (adds to the configured requirements)"),
        Arg::new("arch")
            .long("arch")
            .action(ArgAction::Append)
            .help("Target ABI; may be repeated"),
        Arg::new("ndk_dir").long("ndk-dir").help("Android NDK root"),
        Arg::new("android_api")
            .long("android-api")
            .help("Target Android API level"),
        Arg::new("ndk_api")
            .long("ndk-api")
            .help("Minimum API level to compile against"),
        Arg::new("storage_dir")
            .long("storage-dir")
            .help("Storage root for caches, build trees and distributions"),
        Arg::new("dist_name").long("dist-name").help("Distribution name"),
        Arg::new("bootstrap")
            .long("bootstrap")
            .help("Bootstrap: sdl2, webview, service_only or service_library"),
        Arg::new("recipes")
            .long("recipes")
            .action(ArgAction::Append)
            .help("Extra recipe directories; later ones override earlier ones"),
    ]
}

fn build_cli() -> Command {
    Command::new("crossbake")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Cross-compile recipes for Android ABIs")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("Config file (default: ./crossbake.toml when present)"),
        )
        .subcommand(
            Command::new("build")
                .about("Check prerequisites, resolve, cook every architecture and assemble")
                .args(target_args())
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Rebuild recipes even when their artifacts are up to date"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help("Parallel make jobs per build"),
                )
                .arg(
                    Arg::new("no_strip")
                        .long("no-strip")
                        .action(ArgAction::SetTrue)
                        .help("Do not produce the stripped library variant"),
                ),
        )
        .subcommand(
            Command::new("order")
                .about("Print the resolved build order")
                .args(target_args())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the order and chosen edges as JSON"),
                ),
        )
        .subcommand(
            Command::new("env")
                .about("Print the environment a recipe would be built with")
                .arg(Arg::new("recipe").required(true).help("Recipe to show"))
                .args(target_args()),
        )
        .subcommand(Command::new("check").about("Check host prerequisites only"))
        .subcommand(
            Command::new("recipes").about("List the known recipes").arg(
                Arg::new("recipes")
                    .long("recipes")
                    .action(ArgAction::Append)
                    .help("Extra recipe directories"),
            ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Shell to generate completions for")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("crossbake.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
