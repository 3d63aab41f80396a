// src/recipe/mod.rs

//! Recipe system for cross-compiling libraries
//!
//! A recipe describes one build unit: where its source comes from, which
//! other recipes it needs, which patches to apply under which conditions,
//! which libraries it produces, and how to build it. Recipes are plain
//! values kept in a [`RecipeRegistry`]; the build step itself is a
//! [`BuildProcedure`] trait object.
//!
//! # Culinary Terminology
//!
//! - **Recipe**: How to fetch, patch and build one library
//! - **Kitchen**: Runs recipes for every target architecture
//! - **Cook**: Takes one recipe through its lifecycle for one architecture
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "apsw"
//! version = "3.50.4.0"
//!
//! [source]
//! url = "https://github.com/rogerbinns/apsw/archive/{version}.tar.gz"
//!
//! [dependencies]
//! depends = ["sqlite3", ["setuptools", "hostpython3"]]
//!
//! [environment]
//! LIBS = "-lsqlite3"
//! ```

pub mod format;
pub mod graph;
pub mod kitchen;
pub mod parser;
pub mod procedure;
pub mod resolver;

pub use format::{BuildSection, BuildSystem, RecipeManifest};
pub use kitchen::{Kitchen, KitchenConfig};
pub use parser::{load_recipe_dir, load_registry, parse_recipe, parse_recipe_file};
pub use procedure::{BuildJob, BuildProcedure, NoBuild};
pub use resolver::BuildOrder;

use crate::predicate::Predicate;
use crate::version::RecipeVersion;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One term of a dependency expression
///
/// In manifests a term is either a string or a list of strings:
/// `depends = ["six", ["genericndkbuild", "sdl2"]]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependencyTerm {
    /// Exactly this recipe
    Single(String),
    /// Any one of these recipes, preferred left to right
    AnyOf(Vec<String>),
}

impl DependencyTerm {
    pub fn single(name: &str) -> Self {
        Self::Single(name.to_string())
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(names.into_iter().map(Into::into).collect())
    }

    /// Candidate recipes for this term, in preference order
    pub fn members(&self) -> &[String] {
        match self {
            Self::Single(name) => std::slice::from_ref(name),
            Self::AnyOf(names) => names,
        }
    }
}

impl fmt::Display for DependencyTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(name) => write!(f, "{name}"),
            Self::AnyOf(names) => write!(f, "({})", names.join(" | ")),
        }
    }
}

/// A patch with an optional guard
#[derive(Debug, Clone)]
pub struct PatchSpec {
    /// Patch file, relative to the recipe directory unless absolute
    pub file: PathBuf,
    /// Apply only when this evaluates to true
    pub when: Option<Predicate>,
    /// `-p` level passed to patch
    pub strip: u32,
}

impl PatchSpec {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            when: None,
            strip: 1,
        }
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.when = Some(predicate);
        self
    }

    pub fn with_strip(mut self, strip: u32) -> Self {
        self.strip = strip;
        self
    }
}

/// Flags a recipe hands to the recipes that depend on it
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Exports {
    /// Header directories, relative to the build directory unless absolute
    pub include_dirs: Vec<String>,
    /// Library directories, relative to the build directory unless absolute
    pub lib_dirs: Vec<String>,
    /// Libraries to link, without the `lib` prefix
    pub link_libs: Vec<String>,
}

impl Exports {
    pub fn is_empty(&self) -> bool {
        self.include_dirs.is_empty() && self.lib_dirs.is_empty() && self.link_libs.is_empty()
    }
}

/// A build unit
#[derive(Clone)]
pub struct Recipe {
    pub name: String,
    pub version: RecipeVersion,
    /// Source URL template; `None` for recipes with nothing to fetch
    pub url: Option<String>,
    /// `sha256:<hex>` or `sha512:<hex>`
    pub checksum: Option<String>,
    pub depends: Vec<DependencyTerm>,
    /// Ordering-only dependencies
    pub opt_depends: Vec<DependencyTerm>,
    /// Recipes that must not be part of the same build
    pub conflicts: Vec<String>,
    pub patches: Vec<PatchSpec>,
    /// Produced library file name -> directory relative to the build dir
    pub artifacts: BTreeMap<String, String>,
    pub exports: Exports,
    /// Variables appended to the composed environment, in order
    pub env: Vec<(String, String)>,
    /// Directory the recipe was loaded from; patch paths resolve against it
    pub recipe_dir: Option<PathBuf>,
    pub procedure: Arc<dyn BuildProcedure>,
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("version", &self.version.as_str())
            .field("url", &self.url)
            .field("depends", &self.depends)
            .field("opt_depends", &self.opt_depends)
            .field("patches", &self.patches.len())
            .field("artifacts", &self.artifacts)
            .field("procedure", &self.procedure.family())
            .finish()
    }
}

impl Recipe {
    /// A recipe with nothing to fetch and nothing to build
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: RecipeVersion::parse(version),
            url: None,
            checksum: None,
            depends: Vec::new(),
            opt_depends: Vec::new(),
            conflicts: Vec::new(),
            patches: Vec::new(),
            artifacts: BTreeMap::new(),
            exports: Exports::default(),
            env: Vec::new(),
            recipe_dir: None,
            procedure: Arc::new(NoBuild),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_depends(mut self, terms: impl IntoIterator<Item = DependencyTerm>) -> Self {
        self.depends = terms.into_iter().collect();
        self
    }

    pub fn with_opt_depends(mut self, terms: impl IntoIterator<Item = DependencyTerm>) -> Self {
        self.opt_depends = terms.into_iter().collect();
        self
    }

    pub fn with_conflicts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_patch(mut self, patch: PatchSpec) -> Self {
        self.patches.push(patch);
        self
    }

    /// Declare a produced library and the directory it appears in
    pub fn with_artifact(mut self, file: &str, dir: &str) -> Self {
        self.artifacts.insert(file.to_string(), dir.to_string());
        self
    }

    pub fn with_exports(mut self, exports: Exports) -> Self {
        self.exports = exports;
        self
    }

    /// Append a value to an environment variable after composition
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_recipe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recipe_dir = Some(dir.into());
        self
    }

    pub fn with_procedure(mut self, procedure: Arc<dyn BuildProcedure>) -> Self {
        self.procedure = procedure;
        self
    }

    /// Substitute `{name}`, `{version}` and `{version_major}` in a template
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{name}", &self.name)
            .replace("{version_major}", self.version.major())
            .replace("{version}", self.version.as_str())
    }

    /// Source URL with the version substituted
    pub fn source_url(&self) -> Option<String> {
        self.url.as_deref().map(|u| self.substitute(u))
    }

    /// File name the source archive is cached under
    pub fn archive_filename(&self) -> Option<String> {
        let url = self.source_url()?;
        let from_url = url::Url::parse(&url).ok().and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|s| !s.is_empty())
        });
        Some(from_url.unwrap_or_else(|| format!("{}-{}.tar.gz", self.name, self.version)))
    }

    /// Resolve a patch file against the recipe directory
    pub fn patch_path(&self, patch: &PatchSpec) -> PathBuf {
        match &self.recipe_dir {
            Some(dir) if patch.file.is_relative() => dir.join(&patch.file),
            _ => patch.file.clone(),
        }
    }

    /// Every recipe name mentioned by the dependency expression
    pub fn mentioned_dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends
            .iter()
            .chain(self.opt_depends.iter())
            .flat_map(|t| t.members().iter().map(String::as_str))
    }

    /// Location of a declared artifact under a build directory
    pub fn artifact_path(&self, build_dir: &Path, file: &str) -> Option<PathBuf> {
        let dir = self.artifacts.get(file)?;
        Some(build_dir.join(dir).join(file))
    }
}

/// All known recipes, keyed by name
#[derive(Debug, Clone, Default)]
pub struct RecipeRegistry {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe, returning the one it replaces
    pub fn insert(&mut self, recipe: Recipe) -> Option<Recipe> {
        self.recipes.insert(recipe.name.clone(), recipe)
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Recipe names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl FromIterator<Recipe> for RecipeRegistry {
    fn from_iter<T: IntoIterator<Item = Recipe>>(iter: T) -> Self {
        let mut registry = Self::new();
        for recipe in iter {
            registry.insert(recipe);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_members() {
        assert_eq!(DependencyTerm::single("six").members(), ["six"]);
        let term = DependencyTerm::any_of(["genericndkbuild", "sdl2"]);
        assert_eq!(term.members(), ["genericndkbuild", "sdl2"]);
        assert_eq!(term.to_string(), "(genericndkbuild | sdl2)");
    }

    #[test]
    fn test_term_deserialize_mixed() {
        #[derive(Deserialize)]
        struct Deps {
            depends: Vec<DependencyTerm>,
        }
        let deps: Deps = toml::from_str(r#"depends = [["genericndkbuild", "sdl2"], "six"]"#).unwrap();
        assert_eq!(
            deps.depends,
            vec![
                DependencyTerm::any_of(["genericndkbuild", "sdl2"]),
                DependencyTerm::single("six"),
            ]
        );
    }

    #[test]
    fn test_url_substitution() {
        let recipe = Recipe::new("sqlite3", "3.50.4")
            .with_url("https://github.com/sqlite/sqlite/archive/refs/tags/version-{version}.tar.gz");
        assert_eq!(
            recipe.source_url().unwrap(),
            "https://github.com/sqlite/sqlite/archive/refs/tags/version-3.50.4.tar.gz"
        );
        assert_eq!(recipe.archive_filename().unwrap(), "version-3.50.4.tar.gz");

        let recipe = Recipe::new("openssl", "3.3.1")
            .with_url("https://www.openssl.org/source/old/{version_major}/openssl-{version}.tar.gz");
        assert_eq!(
            recipe.source_url().unwrap(),
            "https://www.openssl.org/source/old/3/openssl-3.3.1.tar.gz"
        );

        assert!(Recipe::new("genericndkbuild", "1.0").archive_filename().is_none());
    }

    #[test]
    fn test_patch_path() {
        let recipe = Recipe::new("pyjnius", "1.6.1").with_recipe_dir("/recipes/pyjnius");
        let relative = PatchSpec::new("fix.patch");
        let absolute = PatchSpec::new("/tmp/other.patch");
        assert_eq!(recipe.patch_path(&relative), PathBuf::from("/recipes/pyjnius/fix.patch"));
        assert_eq!(recipe.patch_path(&absolute), PathBuf::from("/tmp/other.patch"));
        assert_eq!(relative.strip, 1);
    }

    #[test]
    fn test_artifact_path() {
        let recipe = Recipe::new("libopenblas", "0.3.29").with_artifact("libopenblas.so", "build/lib");
        assert_eq!(
            recipe.artifact_path(Path::new("/b"), "libopenblas.so").unwrap(),
            PathBuf::from("/b/build/lib/libopenblas.so")
        );
        assert!(recipe.artifact_path(Path::new("/b"), "libother.so").is_none());
    }

    #[test]
    fn test_registry() {
        let registry: RecipeRegistry = [Recipe::new("b", "1"), Recipe::new("a", "1")]
            .into_iter()
            .collect();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), ["a", "b"]);
        assert!(registry.contains("a"));
        assert!(registry.get("c").is_none());
    }
}
