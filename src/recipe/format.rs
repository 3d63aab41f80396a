// src/recipe/format.rs

//! Recipe manifest format
//!
//! Recipes can be written as TOML manifests. A manifest is a declarative
//! description; [`RecipeManifest::into_recipe`] turns it into a [`Recipe`]
//! value with a build procedure chosen from the build-system table.

use super::{DependencyTerm, Exports, PatchSpec, Recipe, procedure};
use crate::error::Result;
use crate::predicate::Predicate;
use crate::version::RecipeVersion;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A complete recipe manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeManifest {
    /// Recipe metadata
    pub package: PackageSection,

    /// Where the source comes from
    #[serde(default)]
    pub source: SourceSection,

    #[serde(default)]
    pub dependencies: DependencySection,

    /// Patches to apply, in order
    #[serde(default)]
    pub patches: Vec<PatchEntry>,

    /// Produced library file name -> directory inside the build dir
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,

    /// Flags handed to dependents
    #[serde(default)]
    pub exports: Exports,

    /// Build instructions
    #[serde(default)]
    pub build: BuildSection,

    /// Values appended to the composed environment
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Recipe metadata section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

/// Source section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    /// URL template; `{version}` and `{version_major}` are substituted
    #[serde(default)]
    pub url: Option<String>,
    /// `sha256:<hex>` or `sha512:<hex>`
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Dependency section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencySection {
    pub depends: Vec<DependencyTerm>,
    pub opt_depends: Vec<DependencyTerm>,
    pub conflicts: Vec<String>,
}

/// One patch entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchEntry {
    /// Patch file relative to the recipe directory
    pub file: String,
    /// Guard; the patch applies when absent or true
    #[serde(default)]
    pub when: Option<Predicate>,
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_strip() -> u32 {
    1
}

/// Build system family
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BuildSystem {
    Configure,
    Cmake,
    Make,
    Script,
    #[default]
    None,
}

/// Build instructions
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub system: BuildSystem,
    /// Extra arguments for configure/cmake/make
    pub args: Vec<String>,
    /// Extra make arguments after configure
    pub make_args: Vec<String>,
    /// Script body for the `script` system
    pub script: Option<String>,
    /// Build in this subdirectory of the source tree
    pub subdir: Option<String>,
}

impl RecipeManifest {
    /// Turn the manifest into a recipe
    ///
    /// `recipe_dir` is where patch files are looked up.
    pub fn into_recipe(self, recipe_dir: Option<&Path>) -> Result<Recipe> {
        let procedure = procedure::from_section(&self.build)?;

        let patches = self
            .patches
            .into_iter()
            .map(|p| PatchSpec {
                file: PathBuf::from(p.file),
                when: p.when,
                strip: p.strip,
            })
            .collect();

        Ok(Recipe {
            name: self.package.name,
            version: RecipeVersion::parse(&self.package.version),
            url: self.source.url,
            checksum: self.source.checksum,
            depends: self.dependencies.depends,
            opt_depends: self.dependencies.opt_depends,
            conflicts: self.dependencies.conflicts,
            patches,
            artifacts: self.artifacts,
            exports: self.exports,
            env: self.environment.into_iter().collect(),
            recipe_dir: recipe_dir.map(Path::to_path_buf),
            procedure,
        })
    }
}
