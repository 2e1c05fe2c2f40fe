//! Symbol resolution.
//!
//! Turns textual references (call targets, import targets, base classes)
//! into concrete node IDs. Candidates come from the committed graph plus
//! the in-flight build batch; the resolver never mutates committed state.
//!
//! Disambiguation narrows the candidate set rule by rule:
//!
//! 1. exact match in the source's own file
//! 2. exact match within the source's declared language
//! 3. unique match across the whole graph
//! 4. longest shared file-path prefix; a remaining tie is reported as
//!    unresolved with the candidate list, never picked at random

use crate::graph::CodeGraph;
use trellis_core::CodeNode;

/// Outcome of resolving one textual reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The reference names exactly one node.
    Resolved(String),

    /// No candidate, or several that the policy could not separate.
    /// The candidate IDs are kept for diagnostics and later retry.
    Unresolved {
        reference: String,
        candidates: Vec<String>,
    },
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Resolves references against one graph version plus a build batch.
pub struct Resolver<'a> {
    graph: &'a CodeGraph,
    batch: &'a [CodeNode],
    /// File being rebuilt: its committed nodes are about to be replaced,
    /// so they are not valid candidates.
    replacing: Option<&'a str>,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a CodeGraph, batch: &'a [CodeNode]) -> Self {
        Self {
            graph,
            batch,
            replacing: None,
        }
    }

    /// Excludes a file's committed nodes from the candidate scope.
    pub fn excluding_file(mut self, path: &'a str) -> Self {
        self.replacing = Some(path);
        self
    }

    /// Resolves `reference` as seen from `source`.
    pub fn resolve(&self, reference: &str, source: &CodeNode) -> Resolution {
        let mut candidates = self.candidates(reference, source);

        if candidates.is_empty() {
            return Resolution::Unresolved {
                reference: reference.to_string(),
                candidates: Vec::new(),
            };
        }

        // Rule 1: the source's own file wins.
        narrow(&mut candidates, |node| node.file == source.file);
        if candidates.len() == 1 {
            return Resolution::Resolved(candidates[0].id.clone());
        }

        // Rule 2: stay inside the source's language/ecosystem.
        if let Some(language) = source.language.as_deref() {
            narrow(&mut candidates, |node| {
                node.language.as_deref() == Some(language)
            });
            if candidates.len() == 1 {
                return Resolution::Resolved(candidates[0].id.clone());
            }
        }

        // Rule 3 is the unique-across-graph check, already covered by the
        // len == 1 tests above. Rule 4: closest file path by shared prefix.
        let best = candidates
            .iter()
            .map(|node| shared_prefix_len(&node.file, &source.file))
            .max()
            .unwrap_or(0);
        narrow(&mut candidates, |node| {
            shared_prefix_len(&node.file, &source.file) == best
        });
        if candidates.len() == 1 {
            return Resolution::Resolved(candidates[0].id.clone());
        }

        let mut ids: Vec<String> = candidates.iter().map(|node| node.id.clone()).collect();
        ids.sort();
        tracing::debug!(reference, candidates = ids.len(), "ambiguous reference");
        Resolution::Unresolved {
            reference: reference.to_string(),
            candidates: ids,
        }
    }

    /// Nodes whose qualified name or short name equals the reference.
    fn candidates(&self, reference: &str, source: &CodeNode) -> Vec<&CodeNode> {
        let mut found: Vec<&CodeNode> = Vec::new();

        for index in self
            .graph
            .find_by_qualified(reference)
            .into_iter()
            .chain(self.graph.find_by_name(reference))
        {
            if let Some(node) = self.graph.get(index) {
                if self.replacing == Some(node.file.as_str()) {
                    continue;
                }
                found.push(node);
            }
        }

        for node in self.batch {
            if node.qualified_name == reference || node.name == reference {
                found.push(node);
            }
        }

        found.retain(|node| !node.is_placeholder() && node.id != source.id);
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.dedup_by(|a, b| a.id == b.id);
        found
    }
}

/// Applies a filter but keeps the previous set when it would empty it.
fn narrow<'n>(candidates: &mut Vec<&'n CodeNode>, keep: impl Fn(&CodeNode) -> bool) {
    let filtered: Vec<&'n CodeNode> = candidates.iter().copied().filter(|n| keep(n)).collect();
    if !filtered.is_empty() {
        *candidates = filtered;
    }
}

/// Shared string-prefix length between two file paths.
///
/// This tie-break is heuristic but deliberately preserved: it was added to
/// fix same-name collisions between neighboring files in production.
fn shared_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(left, right)| left == right)
        .count()
}
