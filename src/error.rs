// src/error.rs

//! Crate-wide error type
//!
//! Errors fall into the categories of [`ErrorCategory`]. Configuration and
//! prerequisite errors are raised before any build activity starts; fetch,
//! patch and build errors are scoped to one recipe on one architecture.

use crate::process::ToolError;
use crate::recipe::kitchen::FetchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorCategory {
    Configuration,
    Prerequisite,
    Fetch,
    Patch,
    Build,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Unknown recipe: {0}")]
    UnknownRecipe(String),

    #[error("Unknown architecture: {0} (supported: armeabi-v7a, arm64-v8a, x86, x86_64)")]
    UnknownArch(String),

    #[error("Recipe {recipe} has an unsatisfiable dependency: none of [{}] is available", group.join(", "))]
    UnsatisfiableDependency { recipe: String, group: Vec<String> },

    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Recipe {recipe} conflicts with {other}, which is also part of this build")]
    RecipeConflict { recipe: String, other: String },

    #[error("Platform check for '{requested}' cannot run on unsupported host platform '{host}'")]
    UnsupportedHost { requested: String, host: String },

    #[error("Missing mandatory prerequisites: {}", missing.join(", "))]
    PrerequisitesMissing { missing: Vec<String> },

    #[error("Installation of {name} failed: {reason}")]
    InstallFailed { name: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to extract {archive}: {reason}")]
    ExtractFailed { archive: String, reason: String },

    #[error("Patch {patch} does not apply: {reason}")]
    PatchFailed { patch: String, reason: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Declared artifact {artifact} was not produced (expected at {expected})")]
    MissingArtifact { artifact: String, expected: String },

    #[error("Dependency {dependency} of {recipe} is not built for {arch}")]
    DependencyNotReady {
        recipe: String,
        dependency: String,
        arch: String,
    },

    #[error("Build cancelled")]
    Cancelled,
}

impl Error {
    /// Which part of the taxonomy this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) | Self::IoError(_) => ErrorCategory::Io,
            Self::ParseError(_)
            | Self::ConfigError(_)
            | Self::UnknownRecipe(_)
            | Self::UnknownArch(_)
            | Self::UnsatisfiableDependency { .. }
            | Self::DependencyCycle { .. }
            | Self::RecipeConflict { .. }
            | Self::UnsupportedHost { .. } => ErrorCategory::Configuration,
            Self::PrerequisitesMissing { .. } | Self::InstallFailed { .. } => {
                ErrorCategory::Prerequisite
            }
            Self::Fetch(_) | Self::ChecksumMismatch { .. } => ErrorCategory::Fetch,
            Self::PatchFailed { .. } => ErrorCategory::Patch,
            Self::ExtractFailed { .. }
            | Self::Tool(_)
            | Self::MissingArtifact { .. }
            | Self::DependencyNotReady { .. }
            | Self::Cancelled => ErrorCategory::Build,
        }
    }

    /// A short hint on how to fix the error, where one is known
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::UnknownRecipe(name) => Some(format!(
                "add a recipe manifest named {name}.toml to one of the recipe directories"
            )),
            Self::DependencyCycle { .. } => {
                Some("break the cycle by moving one edge to opt_depends".to_string())
            }
            Self::UnsatisfiableDependency { group, .. } => Some(format!(
                "provide a recipe for one of: {}",
                group.join(", ")
            )),
            Self::RecipeConflict { other, .. } => {
                Some(format!("drop {other} from the requirements or pick another bootstrap"))
            }
            Self::PrerequisitesMissing { .. } => Some(
                "install the listed tools, or set CROSSBAKE_SKIP_PREREQUISITES=1 to skip the checks"
                    .to_string(),
            ),
            Self::ChecksumMismatch { .. } => Some(
                "the upstream archive changed; verify the source and update the recipe checksum"
                    .to_string(),
            ),
            Self::PatchFailed { .. } => Some(
                "the patch no longer matches the source; refresh it for the recipe version"
                    .to_string(),
            ),
            Self::Tool(ToolError::NotFound { program }) => {
                Some(format!("install {program} and make sure it is on PATH"))
            }
            Self::Tool(ToolError::TimedOut { .. }) => {
                Some("raise tool_timeout_secs in crossbake.toml".to_string())
            }
            Self::Fetch(_) => Some("check network access or pre-seed the package cache".to_string()),
            _ => None,
        }
    }
}
