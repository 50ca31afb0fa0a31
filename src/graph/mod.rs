//! The mutable directed graph the transformers build and the walker
//! executes. Edges are stored dependency → dependent, so the walker can
//! visit a vertex once all of its incoming edges' sources have
//! completed.

pub mod node;
pub mod reference;
pub mod transform;
pub mod walk;

use node::Node;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("cycle in dependency graph: {0}")]
    Cycle(String),
}

/// Vertices plus directed edges, with identity-based deduplication:
/// adding a node whose id is already present returns the existing
/// vertex.
#[derive(Default)]
pub struct Graph {
    inner: StableDiGraph<Node, ()>,
    by_id: HashMap<String, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn add(&mut self, node: Node) -> NodeIndex {
        let id = node.id();
        if let Some(&idx) = self.by_id.get(&id) {
            return idx;
        }
        let idx = self.inner.add_node(node);
        self.by_id.insert(id, idx);
        idx
    }

    pub fn find(&self, id: &str) -> Option<NodeIndex> {
        self.by_id.get(id).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.inner[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.inner[idx]
    }

    pub fn indices(&self) -> Vec<NodeIndex> {
        self.inner.node_indices().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Record that `dependent` must wait for `dependency`. Self-edges
    /// are ignored; duplicates collapse.
    pub fn connect(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        if dependent == dependency {
            return;
        }
        self.inner.update_edge(dependency, dependent, ());
    }

    pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.inner
            .neighbors_directed(idx, Direction::Incoming)
            .collect()
    }

    pub fn dependents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.inner
            .neighbors_directed(idx, Direction::Outgoing)
            .collect()
    }

    /// All transitive dependents of a vertex (not including itself).
    pub fn descendants(&self, idx: NodeIndex) -> HashSet<NodeIndex> {
        let mut seen = HashSet::new();
        let mut stack = self.dependents(idx);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependents(next));
            }
        }
        seen
    }

    /// All transitive dependencies of a vertex (not including itself).
    pub fn ancestors(&self, idx: NodeIndex) -> HashSet<NodeIndex> {
        let mut seen = HashSet::new();
        let mut stack = self.dependencies(idx);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependencies(next));
            }
        }
        seen
    }

    /// Remove a vertex, reconnecting each dependent to each dependency
    /// so transitive ordering survives the removal.
    pub fn remove_preserving_order(&mut self, idx: NodeIndex) {
        let deps = self.dependencies(idx);
        let dependents = self.dependents(idx);
        for &up in &deps {
            for &down in &dependents {
                self.connect(down, up);
            }
        }
        self.remove(idx);
    }

    pub fn remove(&mut self, idx: NodeIndex) {
        let id = self.inner[idx].id();
        self.by_id.remove(&id);
        self.inner.remove_node(idx);
    }

    /// Verify the graph is acyclic; a remaining cycle is an
    /// unrecoverable planning error.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        for component in tarjan_scc(&self.inner) {
            if component.len() > 1 {
                let mut ids: Vec<String> =
                    component.iter().map(|&i| self.inner[i].id()).collect();
                ids.sort();
                return Err(GraphError::Cycle(ids.join(", ")));
            }
        }
        // tarjan reports self-loops as singleton components.
        for edge in self.inner.edge_references() {
            if edge.source() == edge.target() {
                return Err(GraphError::Cycle(self.inner[edge.source()].id()));
            }
        }
        Ok(())
    }

    /// Debug rendering: one line per vertex with its dependencies.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .inner
            .node_indices()
            .map(|idx| {
                let mut deps: Vec<String> = self
                    .dependencies(idx)
                    .iter()
                    .map(|&d| self.inner[d].id())
                    .collect();
                deps.sort();
                if deps.is_empty() {
                    self.inner[idx].id()
                } else {
                    format!("{} <- [{}]", self.inner[idx].id(), deps.join(", "))
                }
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }
}
