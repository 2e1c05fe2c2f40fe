//! Graph builder: parsed-file records in, node/edge batches out.
//!
//! The builder owns the two-pass shape of a build: materialize the
//! file's nodes first, then resolve every raw reference against the
//! committed graph plus the in-flight batch. What cannot be resolved
//! becomes a placeholder target and a dangling edge, never a dropped
//! reference. Each file builds in isolation; a malformed record fails
//! only its own file.

use crate::edge::{EdgeKind, EdgeRecord};
use crate::resolver::{Resolution, Resolver};
use crate::store::{GraphStore, StoreError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use trellis_core::{node_id, CodeNode, Definition, FileRecord, NodeKind, RecordError, ReferenceKind};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A reference the resolver could not pin to one node.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedReference {
    /// ID of the node the reference originates from.
    pub source: String,
    /// The reference text as written.
    pub reference: String,
    /// Candidate node IDs when the failure was ambiguity; empty when the
    /// name is simply unknown.
    pub candidates: Vec<String>,
}

/// Outcome of building one file.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub file: String,
    pub nodes: usize,
    pub edges: usize,
    pub unresolved: Vec<UnresolvedReference>,
}

/// Builds per-file node/edge batches and commits them to a store.
pub struct GraphBuilder<'a> {
    store: &'a GraphStore,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Builds and commits one file. Rebuilding an unchanged record is
    /// idempotent: identical IDs, identical edge set.
    pub fn build_file(&self, record: &FileRecord) -> Result<BuildReport, BuildError> {
        record.validate()?;

        let (mut nodes, module_id) = materialize_nodes(record);
        let mut edges = containment_edges(&nodes, &module_id);

        // Resolution pass. The committed version of this file is about to
        // be replaced, so it is excluded from the candidate scope.
        let mut placeholders: Vec<CodeNode> = Vec::new();
        let mut placeholder_ids: HashSet<String> = HashSet::new();
        let mut unresolved: Vec<UnresolvedReference> = Vec::new();
        {
            let graph = self.store.read();
            let resolver = Resolver::new(&graph, &nodes).excluding_file(&record.path);

            for (definition, node) in record.definitions.iter().zip(nodes.iter()) {
                for reference in &definition.references {
                    let (source_id, kind) = match reference.kind {
                        // Imports belong to the module, whatever node
                        // carried the statement.
                        ReferenceKind::Import => (module_id.clone(), EdgeKind::Imports),
                        ReferenceKind::Call => (node.id.clone(), EdgeKind::Calls),
                        ReferenceKind::Inherit => (node.id.clone(), EdgeKind::Inherits),
                        ReferenceKind::Reference => (node.id.clone(), EdgeKind::References),
                    };

                    let mut edge = EdgeRecord::new(&source_id, "", kind)
                        .with_reference(&reference.target);
                    edge.line = reference.line;

                    match resolver.resolve(&reference.target, node) {
                        Resolution::Resolved(target_id) => {
                            edge.target = target_id;
                        }
                        Resolution::Unresolved {
                            reference: text,
                            candidates,
                        } => {
                            let placeholder = CodeNode::placeholder(&text, &record.path);
                            edge.target = placeholder.id.clone();
                            edge = edge.with_candidates(candidates.clone());
                            if placeholder_ids.insert(placeholder.id.clone()) {
                                placeholders.push(placeholder);
                            }
                            if !candidates.is_empty() {
                                tracing::warn!(
                                    file = %record.path,
                                    reference = %text,
                                    candidates = candidates.len(),
                                    "ambiguous reference left dangling"
                                );
                            }
                            unresolved.push(UnresolvedReference {
                                source: source_id,
                                reference: text,
                                candidates,
                            });
                        }
                    }
                    edges.push(edge);
                }
            }
        }
        nodes.extend(placeholders);

        let report = BuildReport {
            file: record.path.clone(),
            nodes: nodes.len(),
            edges: edges.len(),
            unresolved,
        };
        tracing::debug!(
            file = %record.path,
            nodes = report.nodes,
            edges = report.edges,
            unresolved = report.unresolved.len(),
            "built file"
        );

        self.store.upsert_file(&record.path, nodes, edges)?;
        Ok(report)
    }

    /// Builds many files, isolating failures per file.
    pub fn build_all(&self, records: &[FileRecord]) -> Vec<Result<BuildReport, BuildError>> {
        records.iter().map(|record| self.build_file(record)).collect()
    }
}

/// Converts definitions to nodes, synthesizing the module node when the
/// record does not carry one. Returns the nodes (aligned with the
/// record's definitions) and the module node's ID.
fn materialize_nodes(record: &FileRecord) -> (Vec<CodeNode>, String) {
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut nodes: Vec<CodeNode> = Vec::with_capacity(record.definitions.len() + 1);
    let mut module_id: Option<String> = None;

    for definition in &record.definitions {
        let node = definition_node(definition, record, &mut used_ids);
        if definition.kind == NodeKind::Module && module_id.is_none() {
            module_id = Some(node.id.clone());
        }
        nodes.push(node);
    }

    let module_id = match module_id {
        Some(id) => id,
        None => {
            let (name, qualified) = module_identity(&record.path);
            let span_end = record
                .definitions
                .iter()
                .map(|d| d.line_end)
                .max()
                .unwrap_or(1);
            let mut module =
                CodeNode::new(NodeKind::Module, name, qualified, record.path.clone())
                    .with_lines(1, span_end.max(1));
            if let Some(language) = &record.language {
                module = module.with_language(language.clone());
            }
            let id = module.id.clone();
            nodes.push(module);
            id
        }
    };

    (nodes, module_id)
}

fn definition_node(
    definition: &Definition,
    record: &FileRecord,
    used_ids: &mut HashSet<String>,
) -> CodeNode {
    let mut node = CodeNode::new(
        definition.kind,
        definition.name.clone(),
        definition.qualified_name.clone(),
        record.path.clone(),
    )
    .with_lines(definition.line_start, definition.line_end)
    .with_complexity(definition.complexity);

    // Overloads collide on kind+file+qualified name; the line suffix keeps
    // IDs unique while staying deterministic for unchanged source.
    let base = node_id(definition.kind, &record.path, &definition.qualified_name);
    node.id = if used_ids.contains(&base) {
        format!("{}:{}", base, definition.line_start)
    } else {
        base
    };
    used_ids.insert(node.id.clone());

    if let Some(docstring) = &definition.docstring {
        node.docstring = Some(docstring.clone());
    }
    if let Some(language) = &record.language {
        node.language = Some(language.clone());
    }
    node.metadata = definition.metadata.clone();
    node
}

/// Contains edges from the qualified-name hierarchy: `pkg.Class.method`
/// hangs off `pkg.Class` when that is in the batch, otherwise off the
/// module node.
fn containment_edges(nodes: &[CodeNode], module_id: &str) -> Vec<EdgeRecord> {
    let by_qualified: HashMap<&str, &str> = nodes
        .iter()
        .filter(|node| !node.qualified_name.is_empty())
        .map(|node| (node.qualified_name.as_str(), node.id.as_str()))
        .collect();

    let mut edges = Vec::new();
    for node in nodes {
        if node.id == module_id || node.is_placeholder() {
            continue;
        }
        let parent = enclosing_qualified(&node.qualified_name)
            .and_then(|prefix| by_qualified.get(prefix).copied())
            .filter(|&parent_id| parent_id != node.id)
            .unwrap_or(module_id);
        edges.push(EdgeRecord::new(parent, &node.id, EdgeKind::Contains));
    }
    edges
}

/// Walks up the dotted path: `a.b.c` yields `a.b`.
fn enclosing_qualified(qualified: &str) -> Option<&str> {
    let (prefix, _) = qualified.rsplit_once('.')?;
    Some(prefix)
}

/// Module name and dotted qualified name derived from a file path.
fn module_identity(path: &str) -> (String, String) {
    let without_ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => path,
    };
    let qualified = without_ext.replace(['/', '\\'], ".");
    let name = qualified
        .rsplit('.')
        .next()
        .unwrap_or(&qualified)
        .to_string();
    (name, qualified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::RawReference;

    fn store() -> GraphStore {
        GraphStore::in_memory("proj")
    }

    fn simple_record(path: &str, function: &str, calls: &[&str]) -> FileRecord {
        let mut def = Definition::function(function, function).with_lines(1, 5);
        for call in calls {
            def = def.with_reference(RawReference::call(*call).at_line(3));
        }
        FileRecord::new(path).with_language("python").with_definition(def)
    }

    #[test]
    fn test_module_synthesized_and_contains() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        let report = builder
            .build_file(&simple_record("pkg/util.py", "helper", &[]))
            .unwrap();

        // Function plus synthesized module.
        assert_eq!(report.nodes, 2);
        let graph = store.read();
        let module = graph.get_by_id("module:pkg/util.py:pkg.util").unwrap();
        assert_eq!(module.name, "util");
        let children = graph.edges_from(
            graph.index_of(&module.id).unwrap(),
            Some(EdgeKind::Contains),
        );
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].target, "function:pkg/util.py:helper");
    }

    #[test]
    fn test_class_method_nesting() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        let record = FileRecord::new("user.py")
            .with_language("python")
            .with_definition(Definition::class("User", "user.User").with_lines(1, 20))
            .with_definition(
                Definition::method("validate", "user.User.validate").with_lines(5, 10),
            );
        builder.build_file(&record).unwrap();

        let graph = store.read();
        let class_index = graph.index_of("class:user.py:user.User").unwrap();
        let children = graph.edges_from(class_index, Some(EdgeKind::Contains));
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].target, "method:user.py:user.User.validate");
    }

    #[test]
    fn test_idempotent_rebuild() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        let record = FileRecord::new("a.py")
            .with_language("python")
            .with_definition(
                Definition::function("foo", "a.foo")
                    .with_lines(1, 4)
                    .with_reference(RawReference::call("bar").at_line(2)),
            )
            .with_definition(Definition::function("bar", "a.bar").with_lines(6, 9));

        builder.build_file(&record).unwrap();
        let first_nodes: Vec<String> = {
            let graph = store.read();
            let mut ids: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
            ids.sort();
            ids
        };
        let first_edges = store.read().export_edges();

        builder.build_file(&record).unwrap();
        let second_nodes: Vec<String> = {
            let graph = store.read();
            let mut ids: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
            ids.sort();
            ids
        };
        let second_edges = store.read().export_edges();

        assert_eq!(first_nodes, second_nodes);
        assert_eq!(first_edges, second_edges);
    }

    #[test]
    fn test_unknown_call_becomes_dangling_edge() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        let report = builder
            .build_file(&simple_record("a.py", "foo", &["missing"]))
            .unwrap();

        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].reference, "missing");
        assert!(report.unresolved[0].candidates.is_empty());

        // The edge exists, pointing at a placeholder; it was not dropped.
        let graph = store.read();
        let dangling = graph.dangling_edges();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].reference.as_deref(), Some("missing"));
    }

    #[test]
    fn test_cross_file_call_resolves_against_committed_graph() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        builder.build_file(&simple_record("b.py", "bar", &[])).unwrap();
        let report = builder
            .build_file(&simple_record("a.py", "foo", &["bar"]))
            .unwrap();

        assert!(report.unresolved.is_empty());
        let graph = store.read();
        let bar = graph.index_of("function:b.py:bar").unwrap();
        let callers = graph.edges_to(bar, Some(EdgeKind::Calls));
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].source, "function:a.py:foo");
    }

    #[test]
    fn test_forward_reference_heals_when_target_file_arrives() {
        let store = store();
        let builder = GraphBuilder::new(&store);

        // a.py calls bar before b.py exists: dangling.
        builder
            .build_file(&simple_record("a.py", "foo", &["bar"]))
            .unwrap();
        assert_eq!(store.read().dangling_edges().len(), 1);

        // b.py arrives; the committed dangling edge re-resolves.
        builder.build_file(&simple_record("b.py", "bar", &[])).unwrap();
        let graph = store.read();
        assert!(graph.dangling_edges().is_empty());
        let bar = graph.index_of("function:b.py:bar").unwrap();
        let callers = graph.edges_to(bar, Some(EdgeKind::Calls));
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].source, "function:a.py:foo");
    }

    #[test]
    fn test_ambiguous_reference_keeps_candidates() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        builder.build_file(&simple_record("pkg/a.py", "dup", &[])).unwrap();
        builder.build_file(&simple_record("pkg/b.py", "dup", &[])).unwrap();

        let report = builder
            .build_file(&simple_record("pkg/c.py", "caller", &["dup"]))
            .unwrap();
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(
            report.unresolved[0].candidates,
            vec![
                "function:pkg/a.py:dup".to_string(),
                "function:pkg/b.py:dup".to_string()
            ]
        );

        let dangling = store.read().dangling_edges();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].candidates.len(), 2);
    }

    #[test]
    fn test_import_edge_lifts_to_module() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        builder.build_file(&simple_record("b.py", "bar", &[])).unwrap();

        let record = FileRecord::new("a.py")
            .with_language("python")
            .with_definition(
                Definition::new(NodeKind::Import, "b", "b")
                    .with_lines(1, 1)
                    .with_reference(RawReference::import("b").at_line(1)),
            );
        builder.build_file(&record).unwrap();

        let graph = store.read();
        let module = graph.index_of("module:a.py:a").unwrap();
        let imports = graph.edges_from(module, Some(EdgeKind::Imports));
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].target, "module:b.py:b");
    }

    #[test]
    fn test_overload_ids_stay_unique_and_deterministic() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        let record = FileRecord::new("a.py")
            .with_definition(Definition::function("run", "a.run").with_lines(1, 3))
            .with_definition(Definition::function("run", "a.run").with_lines(5, 8));
        builder.build_file(&record).unwrap();

        let graph = store.read();
        assert!(graph.get_by_id("function:a.py:a.run").is_some());
        assert!(graph.get_by_id("function:a.py:a.run:5").is_some());
    }

    #[test]
    fn test_bad_record_fails_only_itself() {
        let store = store();
        let builder = GraphBuilder::new(&store);
        let bad = FileRecord::new("");
        let good = simple_record("ok.py", "fine", &[]);

        let results = builder.build_all(&[bad, good]);
        assert!(matches!(results[0], Err(BuildError::Record(_))));
        assert!(results[1].is_ok());
        assert!(store.read().get_by_id("function:ok.py:fine").is_some());
    }
}
