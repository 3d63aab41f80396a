// src/recipe/resolver.rs

//! Dependency resolution
//!
//! Turns a list of requested recipe names into a [`BuildOrder`]. Every
//! dependency term picks exactly one recipe: a member that is already part
//! of the build if there is one, else the first member the registry knows.
//! Optional terms only order recipes that are in the build anyway. The
//! chosen edges are then sorted topologically with [`RecipeGraph`], which
//! breaks ties by discovery order so the result is repeatable.

use super::graph::RecipeGraph;
use super::{DependencyTerm, RecipeRegistry};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;

/// The resolved, immutable build order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOrder {
    recipes: Vec<String>,
    /// Chosen direct dependencies per recipe, in declaration order
    edges: BTreeMap<String, Vec<String>>,
    /// Ordering-only edges from optional dependencies
    optional_edges: BTreeMap<String, Vec<String>>,
}

impl BuildOrder {
    /// Recipes in build order
    pub fn recipes(&self) -> &[String] {
        &self.recipes
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.iter().any(|r| r == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.recipes.iter().position(|r| r == name)
    }

    /// Chosen direct dependencies of a recipe
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Optional dependencies of a recipe that are part of the build
    pub fn optional_dependencies(&self, name: &str) -> &[String] {
        self.optional_edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Chosen dependencies beyond the direct ones, breadth-first
    pub fn transitive_dependencies(&self, name: &str) -> Vec<String> {
        let direct = self.dependencies(name);
        let mut seen: HashSet<&str> = HashSet::from([name]);
        seen.extend(direct.iter().map(String::as_str));
        let mut queue: VecDeque<&str> = direct.iter().map(String::as_str).collect();
        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            for dep in self.dependencies(node) {
                if seen.insert(dep) {
                    result.push(dep.clone());
                    queue.push_back(dep);
                }
            }
        }
        result
    }
}

/// Resolve `requested` against `registry`
pub fn resolve(registry: &RecipeRegistry, requested: &[String]) -> Result<BuildOrder> {
    for name in requested {
        if !registry.contains(name) {
            return Err(Error::UnknownRecipe(name.clone()));
        }
    }

    let mut expansion = Expansion::new(registry);
    for name in requested {
        expansion.include(name);
    }
    for name in requested {
        expansion.visit(name)?;
    }

    // Conflicts are only meaningful once the whole set is known
    for name in &expansion.discovered {
        if let Some(recipe) = registry.get(name) {
            for other in &recipe.conflicts {
                if other != name && expansion.included.contains(other.as_str()) {
                    return Err(Error::RecipeConflict {
                        recipe: name.clone(),
                        other: other.clone(),
                    });
                }
            }
        }
    }

    let mut optional_edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in &expansion.discovered {
        let Some(recipe) = registry.get(name) else {
            continue;
        };
        for term in &recipe.opt_depends {
            for member in term.members() {
                if member != name && expansion.included.contains(member.as_str()) {
                    let deps = optional_edges.entry(name.clone()).or_default();
                    if !deps.contains(member) {
                        deps.push(member.clone());
                    }
                }
            }
        }
    }

    let mut graph = RecipeGraph::new();
    for name in &expansion.discovered {
        graph.add_recipe(name, &[]);
    }
    for (name, deps) in expansion.edges.iter().chain(optional_edges.iter()) {
        for dep in deps {
            graph.add_edge(name, dep);
        }
    }

    let recipes = graph.topological_sort()?;
    debug!("Resolved {} recipes from {} requested", recipes.len(), requested.len());

    Ok(BuildOrder {
        recipes,
        edges: expansion.edges,
        optional_edges,
    })
}

struct Expansion<'a> {
    registry: &'a RecipeRegistry,
    /// Recipes in the order they joined the build
    discovered: Vec<String>,
    included: HashSet<String>,
    visited: HashSet<String>,
    edges: BTreeMap<String, Vec<String>>,
}

impl<'a> Expansion<'a> {
    fn new(registry: &'a RecipeRegistry) -> Self {
        Self {
            registry,
            discovered: Vec::new(),
            included: HashSet::new(),
            visited: HashSet::new(),
            edges: BTreeMap::new(),
        }
    }

    fn include(&mut self, name: &str) {
        if self.included.insert(name.to_string()) {
            self.discovered.push(name.to_string());
        }
    }

    fn select(&self, term: &DependencyTerm) -> Option<String> {
        let members = term.members();
        members
            .iter()
            .find(|m| self.included.contains(m.as_str()))
            .or_else(|| members.iter().find(|m| self.registry.contains(m)))
            .cloned()
    }

    fn visit(&mut self, name: &str) -> Result<()> {
        if !self.visited.insert(name.to_string()) {
            return Ok(());
        }
        let registry: &'a RecipeRegistry = self.registry;
        let Some(recipe) = registry.get(name) else {
            return Err(Error::UnknownRecipe(name.to_string()));
        };

        for term in &recipe.depends {
            let choice = self.select(term).ok_or_else(|| Error::UnsatisfiableDependency {
                recipe: name.to_string(),
                group: term.members().to_vec(),
            })?;

            let deps = self.edges.entry(name.to_string()).or_default();
            if !deps.contains(&choice) {
                deps.push(choice.clone());
            }
            self.include(&choice);
            self.visit(&choice)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{DependencyTerm as T, Recipe};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn registry(recipes: Vec<Recipe>) -> RecipeRegistry {
        recipes.into_iter().collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let registry = registry(vec![
            Recipe::new("sqlite3", "3.50.4"),
            Recipe::new("apsw", "3.50.4.0").with_depends([T::single("sqlite3")]),
        ]);
        let order = resolve(&registry, &names(&["apsw"])).unwrap();
        assert_eq!(order.recipes(), ["sqlite3", "apsw"]);
        assert_eq!(order.dependencies("apsw"), ["sqlite3"]);
        assert!(order.dependencies("sqlite3").is_empty());
    }

    #[test]
    fn test_unknown_requested_recipe() {
        let registry = registry(vec![Recipe::new("sqlite3", "3.50.4")]);
        let err = resolve(&registry, &names(&["sqlite3", "nope"])).unwrap_err();
        assert!(matches!(err, Error::UnknownRecipe(ref n) if n == "nope"));
    }

    #[test]
    fn test_unknown_single_dependency_is_unsatisfiable() {
        let registry = registry(vec![Recipe::new("apsw", "1").with_depends([T::single("sqlite3")])]);
        let err = resolve(&registry, &names(&["apsw"])).unwrap_err();
        match err {
            Error::UnsatisfiableDependency { recipe, group } => {
                assert_eq!(recipe, "apsw");
                assert_eq!(group, ["sqlite3"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_alternative_prefers_left_member() {
        let registry = registry(vec![
            Recipe::new("pyjnius", "1.6.1")
                .with_depends([T::any_of(["genericndkbuild", "sdl2"]), T::single("six")]),
            Recipe::new("genericndkbuild", "1.0"),
            Recipe::new("sdl2", "2.28.5"),
            Recipe::new("six", "1.16.0"),
        ]);
        let order = resolve(&registry, &names(&["pyjnius"])).unwrap();
        assert!(order.contains("genericndkbuild"));
        assert!(!order.contains("sdl2"));
        assert_eq!(order.dependencies("pyjnius"), ["genericndkbuild", "six"]);
    }

    #[test]
    fn test_alternative_prefers_member_already_in_build() {
        let registry = registry(vec![
            Recipe::new("pyjnius", "1.6.1")
                .with_depends([T::any_of(["genericndkbuild", "sdl2"]), T::single("six")]),
            Recipe::new("genericndkbuild", "1.0"),
            Recipe::new("sdl2", "2.28.5"),
            Recipe::new("six", "1.16.0"),
        ]);
        let order = resolve(&registry, &names(&["sdl2", "pyjnius"])).unwrap();
        assert!(order.contains("sdl2"));
        assert!(!order.contains("genericndkbuild"));
        assert_eq!(order.recipes(), ["sdl2", "six", "pyjnius"]);
    }

    #[test]
    fn test_alternative_falls_through_to_available_member() {
        let registry = registry(vec![
            Recipe::new("pyjnius", "1.6.1").with_depends([T::any_of(["genericndkbuild", "sdl2"])]),
            Recipe::new("sdl2", "2.28.5"),
        ]);
        let order = resolve(&registry, &names(&["pyjnius"])).unwrap();
        assert_eq!(order.recipes(), ["sdl2", "pyjnius"]);
    }

    #[test]
    fn test_alternative_with_no_member() {
        let registry = registry(vec![
            Recipe::new("pyjnius", "1.6.1").with_depends([T::any_of(["genericndkbuild", "sdl2"])]),
        ]);
        let err = resolve(&registry, &names(&["pyjnius"])).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsatisfiableDependency { ref group, .. } if group == &["genericndkbuild", "sdl2"]
        ));
    }

    #[test]
    fn test_cycle_names_members() {
        let registry = registry(vec![
            Recipe::new("x", "1").with_depends([T::single("y")]),
            Recipe::new("y", "1").with_depends([T::single("x")]),
        ]);
        match resolve(&registry, &names(&["x"])) {
            Err(Error::DependencyCycle { cycle }) => {
                assert!(cycle.contains(&"x".to_string()));
                assert!(cycle.contains(&"y".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let registry = registry(vec![Recipe::new("x", "1").with_depends([T::single("x")])]);
        assert!(matches!(
            resolve(&registry, &names(&["x"])),
            Err(Error::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_conflict() {
        let registry = registry(vec![
            Recipe::new("openssl", "3.3.1"),
            Recipe::new("boringssl", "1").with_conflicts(["openssl"]),
        ]);
        let err = resolve(&registry, &names(&["openssl", "boringssl"])).unwrap_err();
        assert!(matches!(err, Error::RecipeConflict { ref recipe, ref other }
            if recipe == "boringssl" && other == "openssl"));

        assert!(resolve(&registry, &names(&["boringssl"])).is_ok());
    }

    #[test]
    fn test_optional_dependency_orders_without_including() {
        let registry = registry(vec![
            Recipe::new("python3", "3.11.5").with_opt_depends([T::single("openssl"), T::single("sqlite3")]),
            Recipe::new("openssl", "3.3.1"),
            Recipe::new("sqlite3", "3.50.4"),
        ]);

        let order = resolve(&registry, &names(&["python3"])).unwrap();
        assert_eq!(order.recipes(), ["python3"]);

        let order = resolve(&registry, &names(&["python3", "openssl"])).unwrap();
        assert_eq!(order.recipes(), ["openssl", "python3"]);
        assert_eq!(order.optional_dependencies("python3"), ["openssl"]);
        assert!(order.dependencies("python3").is_empty());
    }

    #[test]
    fn test_every_chosen_dependency_precedes_dependent() {
        let registry = registry(vec![
            Recipe::new("kivy", "2.3.0").with_depends([
                T::any_of(["sdl2", "genericndkbuild"]),
                T::single("pyjnius"),
                T::single("setuptools"),
            ]),
            Recipe::new("pyjnius", "1.6.1").with_depends([T::any_of(["genericndkbuild", "sdl2"]), T::single("six")]),
            Recipe::new("sdl2", "2.28.5"),
            Recipe::new("genericndkbuild", "1.0"),
            Recipe::new("six", "1.16.0"),
            Recipe::new("setuptools", "69.0"),
        ]);
        let order = resolve(&registry, &names(&["kivy"])).unwrap();
        for name in order.recipes() {
            let at = order.position(name).unwrap();
            for dep in order.dependencies(name) {
                assert!(order.position(dep).unwrap() < at, "{dep} must precede {name}");
            }
        }
        // kivy chose sdl2 first, so pyjnius reuses it
        assert!(!order.contains("genericndkbuild"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let build = || {
            registry(vec![
                Recipe::new("app", "1").with_depends([T::single("b"), T::single("a"), T::single("c")]),
                Recipe::new("a", "1"),
                Recipe::new("b", "1"),
                Recipe::new("c", "1").with_depends([T::single("a")]),
            ])
        };
        let first = resolve(&build(), &names(&["app"])).unwrap();
        for _ in 0..20 {
            assert_eq!(resolve(&build(), &names(&["app"])).unwrap(), first);
        }
        assert_eq!(first.recipes(), ["b", "a", "c", "app"]);
    }

    #[test]
    fn test_transitive_dependencies() {
        let registry = registry(vec![
            Recipe::new("app", "1").with_depends([T::single("apsw"), T::single("openssl")]),
            Recipe::new("apsw", "1").with_depends([T::single("sqlite3")]),
            Recipe::new("openssl", "1"),
            Recipe::new("sqlite3", "1").with_depends([T::single("zlib")]),
            Recipe::new("zlib", "1"),
        ]);
        let order = resolve(&registry, &names(&["app"])).unwrap();
        assert_eq!(order.transitive_dependencies("app"), ["sqlite3", "zlib"]);
        assert_eq!(order.transitive_dependencies("apsw"), ["zlib"]);
    }
}
