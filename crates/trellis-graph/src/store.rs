//! Graph store: one graph version per project, shared between readers
//! and a serialized writer.
//!
//! Readers take a snapshot guard and see either the fully-old or
//! fully-new state of a file, never a partial replacement. Writers queue
//! on the write lock; the whole batch is validated before anything
//! mutates, so a bad batch leaves the prior state intact.
//!
//! Persistence is a bincode snapshot in sled, keyed by project path, so
//! several project graphs can share one database.

use crate::edge::EdgeRecord;
use crate::graph::{CodeGraph, GraphStats};
use sled::Db;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use trellis_core::CodeNode;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("invalid batch for {file}: {reason}")]
    Validation { file: String, reason: String },
}

impl StoreError {
    fn validation(file: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

/// The kernel's store handle: a lock-guarded graph version plus optional
/// embedded persistence.
pub struct GraphStore {
    project: String,
    graph: RwLock<CodeGraph>,
    db: Option<Db>,
}

impl GraphStore {
    /// Opens the store for a project, loading its persisted graph version
    /// if one exists.
    pub fn open<P: AsRef<Path>>(project: &str, db_path: P) -> Result<Self, StoreError> {
        let db = sled::open(db_path)?;
        let graph = match db.get(project.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => CodeGraph::new(),
        };
        tracing::info!(project, nodes = graph.node_count(), "graph store opened");
        Ok(Self {
            project: project.to_string(),
            graph: RwLock::new(graph),
            db: Some(db),
        })
    }

    /// An ephemeral store with no on-disk state.
    pub fn in_memory(project: &str) -> Self {
        Self {
            project: project.to_string(),
            graph: RwLock::new(CodeGraph::new()),
            db: None,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Takes a read snapshot. The guard pins one graph version for as
    /// long as it is held; writers wait.
    pub fn read(&self) -> RwLockReadGuard<'_, CodeGraph> {
        self.graph.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CodeGraph> {
        self.graph.write().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Atomically replaces everything attributed to `path`.
    ///
    /// The batch is validated first; any malformed node or edge rejects
    /// the whole batch and the prior state for the file is retained.
    pub fn upsert_file(
        &self,
        path: &str,
        nodes: Vec<CodeNode>,
        edges: Vec<EdgeRecord>,
    ) -> Result<(), StoreError> {
        let mut graph = self.write();
        if let Err(error) = validate_batch(&graph, path, &nodes, &edges) {
            tracing::warn!(file = path, %error, "rejecting upsert batch");
            return Err(error);
        }

        let (node_count, edge_count) = (nodes.len(), edges.len());
        graph.replace_file(path, nodes, edges);
        self.persist(&graph)?;
        tracing::info!(
            file = path,
            nodes = node_count,
            edges = edge_count,
            "file upserted"
        );
        Ok(())
    }

    /// Removes a file's nodes. Edges from other files that referenced
    /// them become dangling rather than disappearing.
    pub fn remove_file(&self, path: &str) -> Result<(), StoreError> {
        let mut graph = self.write();
        graph.purge_file(path);
        self.persist(&graph)?;
        tracing::info!(file = path, "file removed");
        Ok(())
    }

    /// Statistics for the current graph version.
    pub fn stats(&self) -> GraphStats {
        self.read().stats()
    }

    fn persist(&self, graph: &CodeGraph) -> Result<(), StoreError> {
        if let Some(db) = &self.db {
            let bytes = bincode::serialize(graph)?;
            db.insert(self.project.as_bytes(), bytes)?;
            db.flush()?;
        }
        Ok(())
    }
}

/// Checks a whole batch before any mutation.
fn validate_batch(
    graph: &CodeGraph,
    path: &str,
    nodes: &[CodeNode],
    edges: &[EdgeRecord],
) -> Result<(), StoreError> {
    let mut batch_ids: HashSet<&str> = HashSet::with_capacity(nodes.len());

    for node in nodes {
        if node.id.is_empty() {
            return Err(StoreError::validation(path, "node with empty id"));
        }
        if node.name.is_empty() {
            return Err(StoreError::validation(
                path,
                format!("node {} has an empty name", node.id),
            ));
        }
        if node.file != path {
            return Err(StoreError::validation(
                path,
                format!("node {} is attributed to {}", node.id, node.file),
            ));
        }
        if node.line_start > node.line_end {
            return Err(StoreError::validation(
                path,
                format!("node {} has an inverted line span", node.id),
            ));
        }
        if !batch_ids.insert(node.id.as_str()) {
            return Err(StoreError::validation(
                path,
                format!("duplicate node id {}", node.id),
            ));
        }
    }

    for edge in edges {
        if !batch_ids.contains(edge.source.as_str()) {
            return Err(StoreError::validation(
                path,
                format!("edge source {} is not in the batch", edge.source),
            ));
        }
        let target_in_batch = batch_ids.contains(edge.target.as_str());
        let target_in_store = graph
            .get_by_id(&edge.target)
            .map(|node| node.file != path)
            .unwrap_or(false);
        if !target_in_batch && !target_in_store {
            return Err(StoreError::validation(
                path,
                format!("edge target {} does not exist", edge.target),
            ));
        }
    }

    Ok(())
}
