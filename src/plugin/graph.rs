//! Dependency graph over discovered plugins
//!
//! Loading detects cycles on its own, one plugin at a time. This graph checks
//! every discovered plugin at once, for `texpilot plugins check`.

use std::collections::HashMap;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;

use super::manifest::PluginManifest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Plugin '{plugin}' requires unknown plugin '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Requires-graph of plugins; edges point from a dependency to its dependent
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    missing: Vec<(String, String)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from manifests; unknown requirements are remembered
    pub fn from_manifests<'a>(manifests: impl IntoIterator<Item = &'a PluginManifest>) -> Self {
        let mut graph = Self::new();

        // First pass: add all nodes
        let manifests: Vec<_> = manifests.into_iter().collect();
        for manifest in &manifests {
            graph.add_plugin(&manifest.name);
        }

        // Second pass: add all edges
        for manifest in &manifests {
            for dependency in &manifest.requires {
                graph.add_dependency(&manifest.name, dependency);
            }
        }

        graph
    }

    pub fn add_plugin(&mut self, name: &str) {
        if !self.node_map.contains_key(name) {
            let idx = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), idx);
        }
    }

    /// Records that `plugin` requires `dependency`
    pub fn add_dependency(&mut self, plugin: &str, dependency: &str) {
        match (self.node_map.get(plugin), self.node_map.get(dependency)) {
            (Some(&p), Some(&d)) => {
                self.graph.add_edge(d, p, ());
            }
            _ => self
                .missing
                .push((plugin.to_string(), dependency.to_string())),
        }
    }

    /// Direct requirements of a plugin
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Plugins that directly require `name`
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.node_map.get(name) else {
            return Vec::new();
        };

        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        names.sort();
        names
    }

    /// Every problem in the graph: unknown requirements, then cycles
    pub fn problems(&self) -> Vec<GraphError> {
        let mut problems: Vec<GraphError> = self
            .missing
            .iter()
            .map(|(plugin, dependency)| GraphError::MissingDependency {
                plugin: plugin.clone(),
                dependency: dependency.clone(),
            })
            .collect();

        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.find_edge(n, n).is_some());

            if is_cycle {
                let mut names: Vec<String> = component
                    .iter()
                    .filter_map(|&n| self.graph.node_weight(n).cloned())
                    .collect();
                names.sort();
                if let Some(first) = names.first().cloned() {
                    names.push(first);
                }
                problems.push(GraphError::Cycle(names));
            }
        }

        problems
    }

    /// All plugins, dependencies before dependents
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).cloned())
                    .collect()
            })
            .map_err(|cycle| {
                let name = self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default();
                GraphError::Cycle(vec![name])
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}
