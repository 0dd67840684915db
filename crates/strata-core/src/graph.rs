use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::types::{ArchLayer, SourceLocation};

/// Node in the module dependency graph: one module or project within a zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleNode {
    pub name: String,
    pub layer: Option<ArchLayer>,
}

/// Edge in the module dependency graph: one import relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEdge {
    pub location: SourceLocation,
    pub import_path: String,
}

/// Directed dependency graph of zone modules.
pub struct ModuleGraph {
    graph: DiGraph<ModuleNode, ModuleEdge>,
    index: HashMap<String, NodeIndex>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Ensure a module exists as a node, updating an unknown layer if a
    /// concrete one is supplied later.
    pub fn ensure_node(&mut self, name: &str, layer: Option<ArchLayer>) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            if self.graph[idx].layer.is_none() {
                self.graph[idx].layer = layer;
            }
            return idx;
        }
        let idx = self.graph.add_node(ModuleNode {
            name: name.to_string(),
            layer,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Add an import edge between two modules.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: ModuleEdge) {
        self.graph.add_edge(from, to, edge);
    }

    /// Iterate over all edges with their source and target nodes.
    pub fn edges_with_nodes(&self) -> Vec<(&ModuleNode, &ModuleNode, &ModuleEdge)> {
        self.graph
            .edge_references()
            .map(|e| {
                let src = &self.graph[e.source()];
                let tgt = &self.graph[e.target()];
                (src, tgt, e.weight())
            })
            .collect()
    }

    /// Strongly connected components with more than one member, as sorted
    /// module-name groups.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let sccs = petgraph::algo::kosaraju_scc(&self.graph);
        let mut cycles: Vec<Vec<String>> = sccs
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.iter().map(|&idx| self.graph[idx].name.clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> Vec<&ModuleNode> {
        self.graph.node_weights().collect()
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}
