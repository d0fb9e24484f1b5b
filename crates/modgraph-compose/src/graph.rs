//! Instance dependency graph using `petgraph`.
//!
//! Nodes are module instances, with node indices equal to registry arena
//! indices. An edge `a -> b` means instance `a` reads an output of `b`.

use std::sync::Arc;

use modgraph_common::error::{ModgraphError, Result};
use modgraph_common::types::InstanceId;
use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::registry::InstanceRegistry;

/// A directed `(from, to)` pair: `from` depends on `to`.
pub type DependencyEdge = (InstanceId, InstanceId);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// The dependency graph over every instance of a registry.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    registry: Arc<InstanceRegistry>,
    graph: petgraph::Graph<InstanceId, ()>,
}

impl DependencyGraph {
    /// Creates a graph with one node per registry instance and no edges.
    #[must_use]
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        let mut graph = petgraph::Graph::with_capacity(registry.len(), 0);
        for instance in registry.iter() {
            let _ = graph.add_node(instance.id.clone());
        }
        Self { registry, graph }
    }

    /// The registry the graph was built over.
    #[must_use]
    pub const fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Number of instances.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Records that `dependent` reads an output of `dependency`.
    ///
    /// Repeated edges between the same pair are collapsed.
    pub fn add_dependency(&mut self, dependent: usize, dependency: usize) {
        let _ = self
            .graph
            .update_edge(NodeIndex::new(dependent), NodeIndex::new(dependency), ());
    }

    /// Instances that `idx` depends on, in ascending index order.
    #[must_use]
    pub fn dependencies(&self, idx: usize) -> Vec<usize> {
        self.neighbors(idx, Direction::Outgoing)
    }

    /// Instances that depend on `idx`, in ascending index order.
    #[must_use]
    pub fn dependents(&self, idx: usize) -> Vec<usize> {
        self.neighbors(idx, Direction::Incoming)
    }

    fn neighbors(&self, idx: usize, direction: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(idx), direction)
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out
    }

    /// Every edge as `(dependent, dependency)` identifiers, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(from, to)| (self.graph[from].clone(), self.graph[to].clone()))
            .collect();
        edges.sort();
        edges
    }

    /// Returns a topological order of instance indices, dependencies first.
    ///
    /// Uses a depth-first traversal with white/gray/black coloring; reaching
    /// a gray node closes a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ModgraphError::Cycle`] carrying the instances along the
    /// cycle, with the first instance repeated at the end.
    pub fn resolve_order(&self) -> Result<Vec<usize>> {
        let count = self.graph.node_count();
        let mut color = vec![Color::White; count];
        let mut order = Vec::with_capacity(count);

        for root in 0..count {
            if color[root] != Color::White {
                continue;
            }
            // (node, its dependencies, next dependency to visit)
            let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(root, self.dependencies(root), 0)];
            color[root] = Color::Gray;

            while let Some((node, deps, next)) = stack.last_mut() {
                if let Some(&dep) = deps.get(*next) {
                    *next += 1;
                    match color[dep] {
                        Color::White => {
                            color[dep] = Color::Gray;
                            stack.push((dep, self.dependencies(dep), 0));
                        }
                        Color::Gray => {
                            let start = stack.iter().position(|(n, _, _)| *n == dep).unwrap_or(0);
                            let mut path: Vec<InstanceId> = stack[start..]
                                .iter()
                                .map(|(n, _, _)| self.graph[NodeIndex::new(*n)].clone())
                                .collect();
                            path.push(self.graph[NodeIndex::new(dep)].clone());
                            tracing::warn!(cycle = ?path, "dependency cycle detected");
                            return Err(ModgraphError::Cycle { path });
                        }
                        Color::Black => {}
                    }
                } else {
                    let done = *node;
                    color[done] = Color::Black;
                    order.push(done);
                    let _ = stack.pop();
                }
            }
        }

        Ok(order)
    }
}
