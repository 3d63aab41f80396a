// src/lib.rs

//! Crossbake: recipe-driven cross-compilation for Android
//!
//! Crossbake builds native libraries and extension modules for several
//! Android ABIs from a registry of recipes, then assembles them into a
//! distribution directory.
//!
//! # Architecture
//!
//! - Recipes: flat values in a registry, loaded from TOML manifests or
//!   defined in code; the build step is a trait object
//! - Resolution: dependency terms with alternatives, resolved into one
//!   deterministic build order before anything is built
//! - Predicates: tagged boolean checks that gate patches per architecture
//! - Kitchen: one worker per architecture, each walking the build order
//!   through a fetch/verify/extract/patch/build/collect state machine
//! - Prerequisites: host tools checked (and optionally installed) up front

pub mod bootstrap;
pub mod context;
pub mod environment;
mod error;
pub mod pipeline;
pub mod predicate;
pub mod prerequisites;
pub mod process;
pub mod recipe;
pub mod version;

pub use bootstrap::{Assembler, BootstrapKind};
pub use context::{Architecture, BuildConfig, BuildContext, EnvFlags, HostPlatform};
pub use environment::{BuildEnv, EnvironmentComposer};
pub use error::{Error, ErrorCategory, Result};
pub use pipeline::{Pipeline, PipelineReport};
pub use predicate::Predicate;
pub use prerequisites::{ConsentMode, PrerequisiteChecker};
pub use recipe::{BuildOrder, Kitchen, KitchenConfig, Recipe, RecipeRegistry};
pub use version::RecipeVersion;
