//! Core graph data structure.
//!
//! The CodeGraph wraps petgraph and adds indexes for fast lookups. Nodes
//! and edges live in a stable arena, so file removal never invalidates the
//! indexes held for other files. All mutation is whole-file replacement;
//! field-by-field patching does not exist.

use crate::edge::{Edge, EdgeKind, EdgeRecord};
use crate::resolver::{Resolution, Resolver};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trellis_core::{CodeNode, NodeKind};

/// Unique identifier for a node slot in the graph arena.
pub type NodeId = petgraph::stable_graph::NodeIndex;

/// One graph version: the complete node/edge set at a build point.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CodeGraph {
    /// The underlying petgraph arena.
    pub(crate) graph: StableDiGraph<CodeNode, Edge>,

    /// Maps string IDs to graph node indexes.
    id_index: HashMap<String, NodeId>,

    /// Maps short names to node indexes.
    name_index: HashMap<String, Vec<NodeId>>,

    /// Maps qualified names to node indexes.
    qualified_index: HashMap<String, Vec<NodeId>>,

    /// Maps file paths to node indexes (drives incremental replacement).
    file_index: HashMap<String, Vec<NodeId>>,
}

impl CodeGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and registers it in every index.
    pub(crate) fn add_node(&mut self, node: CodeNode) -> NodeId {
        let id = node.id.clone();
        let name = node.name.clone();
        let qualified = node.qualified_name.clone();
        let file = node.file.clone();

        let index = self.graph.add_node(node);

        self.id_index.insert(id, index);
        self.name_index.entry(name).or_default().push(index);
        if !qualified.is_empty() {
            self.qualified_index.entry(qualified).or_default().push(index);
        }
        self.file_index.entry(file).or_default().push(index);

        index
    }

    /// Removes a node and unregisters it from every index.
    fn remove_node(&mut self, index: NodeId) {
        let Some(node) = self.graph.remove_node(index) else {
            return;
        };
        self.id_index.remove(&node.id);
        unregister(&mut self.name_index, &node.name, index);
        unregister(&mut self.qualified_index, &node.qualified_name, index);
        unregister(&mut self.file_index, &node.file, index);
    }

    /// Gets a node by its graph index.
    pub fn get(&self, index: NodeId) -> Option<&CodeNode> {
        self.graph.node_weight(index)
    }

    /// Gets a node by its string ID.
    pub fn get_by_id(&self, id: &str) -> Option<&CodeNode> {
        let index = self.id_index.get(id)?;
        self.graph.node_weight(*index)
    }

    /// Gets the graph index for a string ID.
    pub fn index_of(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    /// Finds all nodes with a given short name.
    pub fn find_by_name(&self, name: &str) -> Vec<NodeId> {
        self.name_index.get(name).cloned().unwrap_or_default()
    }

    /// Finds all nodes with a given qualified name.
    pub fn find_by_qualified(&self, qualified: &str) -> Vec<NodeId> {
        self.qualified_index.get(qualified).cloned().unwrap_or_default()
    }

    /// Finds all nodes in a file.
    pub fn find_by_file(&self, file: &str) -> Vec<NodeId> {
        self.file_index.get(file).cloned().unwrap_or_default()
    }

    /// Resolves a textual node reference the way queries address nodes:
    /// exact ID, then qualified name, then short name. Ties pick the
    /// lexicographically smallest ID so repeated queries agree.
    pub fn lookup_ref(&self, reference: &str) -> Option<NodeId> {
        if let Some(index) = self.index_of(reference) {
            return Some(index);
        }
        for candidates in [
            self.find_by_qualified(reference),
            self.find_by_name(reference),
        ] {
            let best = candidates
                .into_iter()
                .filter(|&idx| self.get(idx).map(|n| !n.is_placeholder()).unwrap_or(false))
                .min_by_key(|&idx| self.get(idx).map(|n| n.id.clone()).unwrap_or_default());
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// All nodes of one kind, sorted by ID for deterministic output.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        let mut indexes: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].kind == kind)
            .collect();
        indexes.sort_by(|&a, &b| self.graph[a].id.cmp(&self.graph[b].id));
        indexes
    }

    /// Iterates over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &CodeNode> {
        self.graph.node_weights()
    }

    /// Iterates over all node indexes.
    pub fn node_indexes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices()
    }

    /// Outgoing edges from a node, optionally filtered by kind.
    pub fn edges_from(&self, from: NodeId, kind: Option<EdgeKind>) -> Vec<EdgeRecord> {
        self.edge_records(from, Direction::Outgoing, kind)
    }

    /// Incoming edges to a node, optionally filtered by kind.
    pub fn edges_to(&self, to: NodeId, kind: Option<EdgeKind>) -> Vec<EdgeRecord> {
        self.edge_records(to, Direction::Incoming, kind)
    }

    fn edge_records(
        &self,
        node: NodeId,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> Vec<EdgeRecord> {
        let mut records: Vec<EdgeRecord> = self
            .graph
            .edges_directed(node, direction)
            .filter(|edge_ref| kind.map_or(true, |k| edge_ref.weight().kind == k))
            .filter_map(|edge_ref| {
                let source = self.graph.node_weight(edge_ref.source())?;
                let target = self.graph.node_weight(edge_ref.target())?;
                let weight = edge_ref.weight();
                Some(EdgeRecord {
                    source: source.id.clone(),
                    target: target.id.clone(),
                    kind: weight.kind,
                    line: weight.line,
                    reference: weight.reference.clone(),
                    candidates: weight.candidates.clone(),
                })
            })
            .collect();
        records.sort_by(|a, b| (&a.source, &a.target, a.kind).cmp(&(&b.source, &b.target, b.kind)));
        records
    }

    /// Returns all edges as ID-addressed records for export.
    pub fn export_edges(&self) -> Vec<EdgeRecord> {
        let mut records: Vec<EdgeRecord> = self
            .graph
            .edge_references()
            .filter_map(|edge_ref| {
                let source = self.graph.node_weight(edge_ref.source())?;
                let target = self.graph.node_weight(edge_ref.target())?;
                let weight = edge_ref.weight();
                Some(EdgeRecord {
                    source: source.id.clone(),
                    target: target.id.clone(),
                    kind: weight.kind,
                    line: weight.line,
                    reference: weight.reference.clone(),
                    candidates: weight.candidates.clone(),
                })
            })
            .collect();
        records.sort_by(|a, b| (&a.source, &a.target, a.kind).cmp(&(&b.source, &b.target, b.kind)));
        records
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges whose target is an unresolved placeholder.
    pub fn dangling_edges(&self) -> Vec<EdgeRecord> {
        let mut records: Vec<EdgeRecord> = self
            .graph
            .edge_references()
            .filter_map(|edge_ref| {
                let source = self.graph.node_weight(edge_ref.source())?;
                let target = self.graph.node_weight(edge_ref.target())?;
                if !target.is_placeholder() {
                    return None;
                }
                let weight = edge_ref.weight();
                Some(EdgeRecord {
                    source: source.id.clone(),
                    target: target.id.clone(),
                    kind: weight.kind,
                    line: weight.line,
                    reference: weight.reference.clone(),
                    candidates: weight.candidates.clone(),
                })
            })
            .collect();
        records.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        records
    }

    /// Replaces everything attributed to `path` with a new node/edge set.
    ///
    /// Edges from other files into the old nodes are preserved as dangling
    /// edges rather than dropped, then the whole graph re-resolves, so
    /// references heal once their target reappears.
    pub(crate) fn replace_file(
        &mut self,
        path: &str,
        nodes: Vec<CodeNode>,
        edges: Vec<EdgeRecord>,
    ) {
        self.detach_file(path);

        for node in nodes {
            self.add_node(node);
        }
        for record in edges {
            let (Some(source), Some(target)) =
                (self.index_of(&record.source), self.index_of(&record.target))
            else {
                // Validated upstream; an unknown endpoint here means the
                // batch was corrupted in flight.
                tracing::warn!(source = %record.source, target = %record.target, "skipping edge with unknown endpoint");
                continue;
            };
            self.graph.add_edge(source, target, record.weight());
        }

        self.reresolve_dangling();
    }

    /// Removes a file's nodes and incident edges. Cross-file edges into
    /// the removed nodes become dangling, preserving provenance.
    pub(crate) fn purge_file(&mut self, path: &str) {
        self.detach_file(path);
        self.reresolve_dangling();
    }

    /// Deletes `path`'s nodes, rewriting cross-file incoming edges to
    /// placeholder targets owned by the referencing file.
    fn detach_file(&mut self, path: &str) {
        let Some(indexes) = self.file_index.get(path).cloned() else {
            return;
        };

        // Collect the cross-file references before any removal.
        let mut orphaned: Vec<(NodeId, String, EdgeKind, Option<u32>, String)> = Vec::new();
        for &index in &indexes {
            for edge_ref in self.graph.edges_directed(index, Direction::Incoming) {
                let Some(source) = self.graph.node_weight(edge_ref.source()) else {
                    continue;
                };
                if source.file == path {
                    continue;
                }
                let weight = edge_ref.weight();
                if let Some(reference) = &weight.reference {
                    orphaned.push((
                        edge_ref.source(),
                        source.file.clone(),
                        weight.kind,
                        weight.line,
                        reference.clone(),
                    ));
                }
            }
        }

        for index in indexes {
            self.remove_node(index);
        }

        for (source, source_file, kind, line, reference) in orphaned {
            let placeholder = CodeNode::placeholder(&reference, &source_file);
            let target = match self.index_of(&placeholder.id) {
                Some(existing) => existing,
                None => self.add_node(placeholder),
            };
            let mut edge = Edge::new(kind).with_reference(reference);
            edge.line = line;
            self.graph.add_edge(source, target, edge);
        }
    }

    /// Retries resolution for every dangling edge against the current
    /// graph version. Resolved edges are rewired to their real target;
    /// placeholders that no longer carry edges are removed.
    pub(crate) fn reresolve_dangling(&mut self) {
        let mut rewires = Vec::new();
        {
            let resolver = Resolver::new(self, &[]);
            for edge_ref in self.graph.edge_references() {
                let Some(target) = self.graph.node_weight(edge_ref.target()) else {
                    continue;
                };
                if !target.is_placeholder() {
                    continue;
                }
                let (Some(source), Some(reference)) = (
                    self.graph.node_weight(edge_ref.source()),
                    edge_ref.weight().reference.as_deref(),
                ) else {
                    continue;
                };
                if let Resolution::Resolved(resolved_id) = resolver.resolve(reference, source) {
                    rewires.push((
                        edge_ref.id(),
                        edge_ref.source(),
                        edge_ref.target(),
                        resolved_id,
                        edge_ref.weight().kind,
                        edge_ref.weight().line,
                        reference.to_string(),
                    ));
                }
            }
        }

        let mut emptied = Vec::new();
        for (edge_id, source, placeholder, resolved_id, kind, line, reference) in rewires {
            let Some(target) = self.index_of(&resolved_id) else {
                continue;
            };
            self.graph.remove_edge(edge_id);
            let mut edge = Edge::new(kind).with_reference(reference);
            edge.line = line;
            self.graph.add_edge(source, target, edge);
            if self
                .graph
                .edges_directed(placeholder, Direction::Incoming)
                .next()
                .is_none()
            {
                emptied.push(placeholder);
            }
        }
        for placeholder in emptied {
            self.remove_node(placeholder);
        }
    }

    /// Nodes that depend on the given node, directly or transitively, to a
    /// bounded depth. Returns `(node, depth)` pairs sorted by depth then ID.
    pub fn dependents(&self, index: NodeId, max_depth: usize) -> Vec<(&CodeNode, usize)> {
        self.bounded_neighborhood(index, Direction::Incoming, max_depth)
    }

    /// Nodes the given node depends on, to a bounded depth.
    pub fn dependencies(&self, index: NodeId, max_depth: usize) -> Vec<(&CodeNode, usize)> {
        self.bounded_neighborhood(index, Direction::Outgoing, max_depth)
    }

    fn bounded_neighborhood(
        &self,
        origin: NodeId,
        direction: Direction,
        max_depth: usize,
    ) -> Vec<(&CodeNode, usize)> {
        let traversal = crate::traversal::bfs(
            self,
            origin,
            direction,
            EdgeKind::dependency_kinds(),
            max_depth,
        );
        traversal
            .visits
            .iter()
            .filter_map(|visit| self.get(visit.node).map(|node| (node, visit.depth)))
            .collect()
    }

    /// Returns graph statistics.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            files: self.file_index.len(),
            dangling_edges: self.dangling_edges().len(),
        }
    }

    /// Files currently represented in this graph version, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.file_index.keys().cloned().collect();
        files.sort();
        files
    }
}

/// Drops one index entry, pruning the key once its list empties.
fn unregister(map: &mut HashMap<String, Vec<NodeId>>, key: &str, index: NodeId) {
    let emptied = match map.get_mut(key) {
        Some(list) => {
            list.retain(|&idx| idx != index);
            list.is_empty()
        }
        None => false,
    };
    if emptied {
        map.remove(key);
    }
}

/// Graph statistics for collaborators' info surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub files: usize,
    pub dangling_edges: usize,
}
