// src/recipe/graph.rs

//! Recipe dependency graph for build ordering
//!
//! A directed graph of recipes where an edge `a -> b` means `a` depends on
//! `b`. Nodes remember the order in which they were added, and that
//! discovery order is the tie-breaker of the topological sort, so the same
//! sequence of `add_recipe` calls always yields the same build order.
//!
//! # Example
//!
//! ```
//! use crossbake::recipe::graph::RecipeGraph;
//!
//! let mut graph = RecipeGraph::new();
//! graph.add_recipe("apsw", &["sqlite3"]);
//! graph.add_recipe("sqlite3", &[]);
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, ["sqlite3", "apsw"]);
//! ```

use crate::error::{Error, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A directed graph representing recipe dependencies
#[derive(Debug, Default, Clone)]
pub struct RecipeGraph {
    /// Node names in discovery order
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    /// Outgoing edges (dependencies) per node, in declaration order
    edges: Vec<Vec<usize>>,
    /// Incoming edges (dependents) per node
    reverse_edges: Vec<Vec<usize>>,
}

impl RecipeGraph {
    /// Create a new empty recipe graph
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.edges.push(Vec::new());
        self.reverse_edges.push(Vec::new());
        idx
    }

    /// Add a recipe with its dependencies
    ///
    /// If the recipe already exists, this merges the dependencies. Duplicate
    /// edges are ignored.
    pub fn add_recipe(&mut self, name: &str, dependencies: &[&str]) {
        let from = self.node(name);
        for dep in dependencies {
            self.add_edge_idx(from, self.index.get(*dep).copied(), dep);
        }
    }

    /// Add a single dependency edge `from -> to`
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.node(from);
        self.add_edge_idx(from, self.index.get(to).copied(), to);
    }

    fn add_edge_idx(&mut self, from: usize, to: Option<usize>, to_name: &str) {
        let to = match to {
            Some(idx) => idx,
            None => self.node(to_name),
        };
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
            self.reverse_edges[to].push(from);
        }
    }

    /// Perform topological sort using Kahn's algorithm
    ///
    /// Returns the recipes in build order (dependencies before dependents).
    /// Among recipes that are ready at the same time, the one discovered
    /// first comes first. A cycle is reported with the recipes on it.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut in_degrees: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        let mut ready: BinaryHeap<Reverse<usize>> = in_degrees
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        while let Some(Reverse(node)) = ready.pop() {
            result.push(self.nodes[node].clone());

            for &dependent in &self.reverse_edges[node] {
                in_degrees[dependent] -= 1;
                if in_degrees[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if result.len() != self.nodes.len() {
            let cycle = self.find_cycles().into_iter().next().unwrap_or_else(|| {
                // Unreachable for a graph Kahn could not finish, but keep the
                // leftover nodes as the report
                self.nodes
                    .iter()
                    .filter(|n| !result.contains(n))
                    .cloned()
                    .collect()
            });
            return Err(Error::DependencyCycle { cycle });
        }

        Ok(result)
    }

    /// Find all cycles in the graph
    ///
    /// Each cycle lists its recipes starting and ending with the same name,
    /// e.g. `["x", "y", "x"]`.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if !visited.contains(&start) {
                self.find_cycles_dfs(start, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn find_cycles_dfs(
        &self,
        node: usize,
        visited: &mut HashSet<usize>,
        on_stack: &mut HashSet<usize>,
        path: &mut Vec<usize>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        for &dep in &self.edges[node] {
            if !visited.contains(&dep) {
                self.find_cycles_dfs(dep, visited, on_stack, path, cycles);
            } else if on_stack.contains(&dep)
                && let Some(start) = path.iter().position(|&x| x == dep)
            {
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&i| self.nodes[i].clone()).collect();
                cycle.push(self.nodes[dep].clone());
                cycles.push(cycle);
            }
        }

        path.pop();
        on_stack.remove(&node);
    }
}
