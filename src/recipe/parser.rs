// src/recipe/parser.rs

//! Recipe file parsing and loading

use super::format::{BuildSystem, RecipeManifest};
use super::{Recipe, RecipeRegistry};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parse a recipe manifest from a TOML string
pub fn parse_manifest(content: &str) -> Result<RecipeManifest> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse and validate a recipe from a TOML string
pub fn parse_recipe(content: &str, recipe_dir: Option<&Path>) -> Result<Recipe> {
    let manifest = parse_manifest(content)?;
    for warning in validate_manifest(&manifest)? {
        warn!("recipe {}: {}", manifest.package.name, warning);
    }
    manifest.into_recipe(recipe_dir)
}

/// Parse a recipe from a file
///
/// Patch paths resolve against the directory holding the file.
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read recipe file {}: {}", path.display(), e)))?;

    parse_recipe(&content, path.parent())
        .map_err(|e| match e {
            Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
            other => other,
        })
}

/// Validate a manifest for completeness and correctness
///
/// Returns warnings for things that are allowed but suspicious.
pub fn validate_manifest(manifest: &RecipeManifest) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let name = &manifest.package.name;

    if name.is_empty() {
        return Err(Error::ParseError("Recipe package name cannot be empty".to_string()));
    }
    if name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(Error::ParseError(format!("Invalid recipe name: {}", name)));
    }
    if manifest.package.version.trim().is_empty() {
        return Err(Error::ParseError(format!("Recipe {} has an empty version", name)));
    }

    if let Some(checksum) = &manifest.source.checksum {
        let valid = [("sha256:", 64), ("sha512:", 128)].iter().any(|(prefix, len)| {
            checksum.strip_prefix(prefix).is_some_and(|hex| {
                hex.len() == *len && hex.chars().all(|c| c.is_ascii_hexdigit())
            })
        });
        if !valid {
            return Err(Error::ParseError(format!(
                "Invalid checksum format: {}. Expected sha256:<64 hex> or sha512:<128 hex>",
                checksum
            )));
        }
        if manifest.source.url.is_none() {
            warnings.push("checksum given without a source url".to_string());
        }
    } else if manifest.source.url.is_some() {
        warnings.push("source has no checksum; downloads are not verified".to_string());
    }

    for term in manifest
        .dependencies
        .depends
        .iter()
        .chain(manifest.dependencies.opt_depends.iter())
    {
        if term.members().is_empty() {
            return Err(Error::ParseError(format!(
                "Recipe {} has an empty alternative group",
                name
            )));
        }
        if term.members().iter().any(|m| m == name) {
            return Err(Error::ParseError(format!("Recipe {} depends on itself", name)));
        }
    }

    if manifest.source.url.is_none() && !manifest.patches.is_empty() {
        warnings.push("patches declared but there is no source to patch".to_string());
    }
    if manifest.build.system == BuildSystem::None && !manifest.artifacts.is_empty() && manifest.source.url.is_some() {
        warnings.push("artifacts declared but no build system is set".to_string());
    }

    Ok(warnings)
}

/// Load every recipe in `dir` into `registry`
///
/// Both `<dir>/<name>.toml` and `<dir>/<name>/recipe.toml` are recognised.
/// A recipe replaces an earlier one with the same name. Returns the number
/// of recipes loaded.
pub fn load_recipe_dir(dir: &Path, registry: &mut RecipeRegistry) -> Result<usize> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| Error::IoError(format!("Failed to read recipe directory {}: {}", dir.display(), e)))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut count = 0;
    for path in entries {
        let file = if path.is_dir() {
            let nested = path.join("recipe.toml");
            if !nested.is_file() {
                continue;
            }
            nested
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            path
        } else {
            continue;
        };

        let recipe = parse_recipe_file(&file)?;
        debug!("Loaded recipe {} {} from {}", recipe.name, recipe.version, file.display());
        if let Some(previous) = registry.insert(recipe) {
            debug!("Recipe {} overrides an earlier definition", previous.name);
        }
        count += 1;
    }
    Ok(count)
}

/// Build a registry from several recipe directories, later ones overriding
pub fn load_registry(dirs: &[PathBuf]) -> Result<RecipeRegistry> {
    let mut registry = RecipeRegistry::new();
    for dir in dirs {
        let count = load_recipe_dir(dir, &mut registry)?;
        debug!("Loaded {} recipes from {}", count, dir.display());
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[package]
name = "test"
version = "1.0"
"#;

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(MINIMAL, None).unwrap();
        assert_eq!(recipe.name, "test");
        assert!(recipe.url.is_none());
    }

    #[test]
    fn test_parse_invalid_recipe() {
        let content = "this is not valid toml at all {}";
        assert!(matches!(parse_recipe(content, None), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_validate_empty_name() {
        let manifest = parse_manifest("[package]\nname = \"\"\nversion = \"1.0\"\n").unwrap();
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn test_validate_bad_checksum() {
        let content = r#"
[package]
name = "test"
version = "1.0"

[source]
url = "https://example.com/test.tar.gz"
checksum = "md5:abc123"
"#;
        let manifest = parse_manifest(content).unwrap();
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn test_validate_self_dependency() {
        let content = r#"
[package]
name = "test"
version = "1.0"

[dependencies]
depends = [["other", "test"]]
"#;
        let manifest = parse_manifest(content).unwrap();
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[package]
name = "test"
version = "1.0"

[source]
url = "https://example.com/test-{version}.tar.gz"

[artifacts]
"libtest.so" = "."
"#;
        let manifest = parse_manifest(content).unwrap();
        let warnings = validate_manifest(&manifest).unwrap();
        assert!(warnings.iter().any(|w| w.contains("checksum")));
        assert!(warnings.iter().any(|w| w.contains("build system")));
    }

    #[test]
    fn test_load_recipe_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sqlite3.toml"), "[package]\nname = \"sqlite3\"\nversion = \"3.50.4\"\n").unwrap();
        fs::create_dir(dir.path().join("pyjnius")).unwrap();
        fs::write(
            dir.path().join("pyjnius/recipe.toml"),
            "[package]\nname = \"pyjnius\"\nversion = \"1.6.1\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a recipe").unwrap();

        let mut registry = RecipeRegistry::new();
        let count = load_recipe_dir(dir.path(), &mut registry).unwrap();
        assert_eq!(count, 2);
        assert!(registry.contains("sqlite3"));
        let pyjnius = registry.get("pyjnius").unwrap();
        assert_eq!(pyjnius.recipe_dir.as_deref(), Some(dir.path().join("pyjnius").as_path()));
    }

    #[test]
    fn test_load_reports_file_on_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.toml"), "[package]\nname = 1\n").unwrap();
        let mut registry = RecipeRegistry::new();
        let err = load_recipe_dir(dir.path(), &mut registry).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_later_dirs_override() {
        let base = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        fs::write(base.path().join("sqlite3.toml"), "[package]\nname = \"sqlite3\"\nversion = \"3.45.0\"\n").unwrap();
        fs::write(local.path().join("sqlite3.toml"), "[package]\nname = \"sqlite3\"\nversion = \"3.50.4\"\n").unwrap();

        let registry = load_registry(&[base.path().to_path_buf(), local.path().to_path_buf()]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("sqlite3").unwrap().version.as_str(), "3.50.4");
    }
}
