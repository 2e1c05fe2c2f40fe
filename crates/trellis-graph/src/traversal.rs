//! Bounded graph traversal.
//!
//! BFS over edges of selected kinds with a visited set and a depth
//! bound, so cyclic graphs always terminate and no node is reported
//! twice from one direction. Impact queries walk both directions and
//! band hop distance into a severity label.

use crate::edge::EdgeKind;
use crate::graph::{CodeGraph, NodeId};
use crate::planner::Orientation;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Severity of impact based on hop distance from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// 1 hop: immediate neighbors.
    Direct,
    /// 2-3 hops: transitively connected.
    Transitive,
    /// 4+ hops: distantly connected.
    Distant,
}

impl Severity {
    pub fn from_hops(hops: usize) -> Self {
        match hops {
            0 | 1 => Severity::Direct,
            2 | 3 => Severity::Transitive,
            _ => Severity::Distant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Direct => "direct",
            Severity::Transitive => "transitive",
            Severity::Distant => "distant",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node reached by a traversal.
#[derive(Debug, Clone)]
pub struct Visit {
    pub node: NodeId,
    /// Hop distance from the origin.
    pub depth: usize,
    /// Kind of the first edge that reached this node.
    pub entry: EdgeKind,
    /// Which way the traversal was walking when it got here.
    pub direction: Direction,
}

/// Everything a bounded traversal found.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    pub visits: Vec<Visit>,
    /// True when the depth bound cut off unvisited neighbors.
    pub truncated: bool,
}

/// BFS in one direction from `origin`, following only `kinds` edges.
///
/// The origin itself is not reported. A node is visited at most once,
/// at its shallowest depth.
pub fn bfs(
    graph: &CodeGraph,
    origin: NodeId,
    direction: Direction,
    kinds: &[EdgeKind],
    max_depth: usize,
) -> Traversal {
    let mut traversal = Traversal::default();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<(NodeId, usize, EdgeKind)> = VecDeque::new();

    visited.insert(origin);
    seed_neighbors(graph, origin, direction, kinds, 0, max_depth, &mut queue, &mut visited, &mut traversal);

    while let Some((current, depth, entry)) = queue.pop_front() {
        traversal.visits.push(Visit {
            node: current,
            depth,
            entry,
            direction,
        });
        seed_neighbors(
            graph,
            current,
            direction,
            kinds,
            depth,
            max_depth,
            &mut queue,
            &mut visited,
            &mut traversal,
        );
    }

    sort_visits(graph, &mut traversal.visits);
    traversal
}

#[allow(clippy::too_many_arguments)]
fn seed_neighbors(
    graph: &CodeGraph,
    from: NodeId,
    direction: Direction,
    kinds: &[EdgeKind],
    depth: usize,
    max_depth: usize,
    queue: &mut VecDeque<(NodeId, usize, EdgeKind)>,
    visited: &mut HashSet<NodeId>,
    traversal: &mut Traversal,
) {
    for edge_ref in graph.graph.edges_directed(from, direction) {
        if !kinds.contains(&edge_ref.weight().kind) {
            continue;
        }
        let neighbor = match direction {
            Direction::Incoming => edge_ref.source(),
            Direction::Outgoing => edge_ref.target(),
        };
        if visited.contains(&neighbor) {
            continue;
        }
        if depth >= max_depth {
            // More graph beyond the bound: report a partial result.
            traversal.truncated = true;
            continue;
        }
        visited.insert(neighbor);
        queue.push_back((neighbor, depth + 1, edge_ref.weight().kind));
    }
}

/// BFS from `origin` in the direction(s) the plan asked for. For
/// `Both`, the two walks stay separate so a node connected both ways
/// shows up once per side.
pub fn neighborhood(
    graph: &CodeGraph,
    origin: NodeId,
    orientation: Orientation,
    kinds: &[EdgeKind],
    max_depth: usize,
) -> Traversal {
    match orientation {
        Orientation::Forward => bfs(graph, origin, Direction::Outgoing, kinds, max_depth),
        Orientation::Reverse => bfs(graph, origin, Direction::Incoming, kinds, max_depth),
        Orientation::Both => {
            let mut upstream = bfs(graph, origin, Direction::Incoming, kinds, max_depth);
            let downstream = bfs(graph, origin, Direction::Outgoing, kinds, max_depth);
            upstream.truncated |= downstream.truncated;
            upstream.visits.extend(downstream.visits);
            sort_visits(graph, &mut upstream.visits);
            upstream
        }
    }
}

/// Unweighted shortest path from `from` to `to`, optionally restricted
/// to one edge kind, bounded by `max_depth` hops.
pub fn shortest_path(
    graph: &CodeGraph,
    from: NodeId,
    to: NodeId,
    via: Option<EdgeKind>,
    max_depth: usize,
) -> Option<Vec<NodeId>> {
    if from == to {
        return Some(vec![from]);
    }

    let mut parents: std::collections::HashMap<NodeId, NodeId> = std::collections::HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
    visited.insert(from);
    queue.push_back((from, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        // Deterministic expansion order keeps tie-broken paths stable.
        let mut neighbors: Vec<NodeId> = graph
            .graph
            .edges_directed(current, Direction::Outgoing)
            .filter(|edge_ref| {
                let kind = edge_ref.weight().kind;
                match via {
                    Some(wanted) => kind == wanted,
                    None => kind.is_dependency(),
                }
            })
            .map(|edge_ref| edge_ref.target())
            .collect();
        neighbors.sort_by(|&a, &b| node_sort_key(graph, a).cmp(&node_sort_key(graph, b)));

        for neighbor in neighbors {
            if visited.contains(&neighbor) {
                continue;
            }
            visited.insert(neighbor);
            parents.insert(neighbor, current);
            if neighbor == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&parent) = parents.get(&cursor) {
                    path.push(parent);
                    cursor = parent;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back((neighbor, depth + 1));
        }
    }

    None
}

fn node_sort_key<'g>(graph: &'g CodeGraph, node: NodeId) -> &'g str {
    graph.get(node).map(|n| n.id.as_str()).unwrap_or("")
}

/// Stable output order: depth, then node ID.
fn sort_visits(graph: &CodeGraph, visits: &mut [Visit]) {
    visits.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| node_sort_key(graph, a.node).cmp(node_sort_key(graph, b.node)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeRecord;
    use trellis_core::{CodeNode, NodeKind};

    fn function(name: &str) -> CodeNode {
        CodeNode::new(NodeKind::Function, name, name, "t.py").with_lines(1, 1)
    }

    fn chain_graph(edges: &[(&str, &str)]) -> CodeGraph {
        let mut names: Vec<&str> = edges.iter().flat_map(|(a, b)| [*a, *b]).collect();
        names.sort();
        names.dedup();
        let nodes: Vec<CodeNode> = names.iter().map(|n| function(n)).collect();
        let records: Vec<EdgeRecord> = edges
            .iter()
            .map(|(a, b)| {
                EdgeRecord::new(
                    format!("function:t.py:{a}"),
                    format!("function:t.py:{b}"),
                    EdgeKind::Calls,
                )
            })
            .collect();
        let mut graph = CodeGraph::new();
        graph.replace_file("t.py", nodes, records);
        graph
    }

    fn idx(graph: &CodeGraph, name: &str) -> NodeId {
        graph.index_of(&format!("function:t.py:{name}")).unwrap()
    }

    #[test]
    fn test_cycle_terminates_each_node_once() {
        // a → b → a
        let graph = chain_graph(&[("a", "b"), ("b", "a")]);
        let traversal = bfs(
            &graph,
            idx(&graph, "a"),
            Direction::Incoming,
            &[EdgeKind::Calls],
            5,
        );

        // Only b is reported: a is the origin and never revisited.
        assert_eq!(traversal.visits.len(), 1);
        assert_eq!(graph.get(traversal.visits[0].node).unwrap().name, "b");
    }

    #[test]
    fn test_depth_bound_sets_truncated() {
        // a → b → c → d
        let graph = chain_graph(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let traversal = bfs(
            &graph,
            idx(&graph, "a"),
            Direction::Outgoing,
            &[EdgeKind::Calls],
            2,
        );

        let names: Vec<&str> = traversal
            .visits
            .iter()
            .map(|v| graph.get(v.node).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(traversal.truncated);

        let full = bfs(
            &graph,
            idx(&graph, "a"),
            Direction::Outgoing,
            &[EdgeKind::Calls],
            5,
        );
        assert!(!full.truncated);
        assert_eq!(full.visits.len(), 3);
    }

    #[test]
    fn test_visits_record_depth_and_entry_edge() {
        let graph = chain_graph(&[("a", "b"), ("b", "c")]);
        let traversal = bfs(
            &graph,
            idx(&graph, "a"),
            Direction::Outgoing,
            &[EdgeKind::Calls],
            5,
        );
        assert_eq!(traversal.visits[0].depth, 1);
        assert_eq!(traversal.visits[1].depth, 2);
        assert_eq!(traversal.visits[0].entry, EdgeKind::Calls);
    }

    #[test]
    fn test_both_orientation_reports_each_side() {
        // up → x → down
        let graph = chain_graph(&[("up", "x"), ("x", "down")]);
        let traversal = neighborhood(
            &graph,
            idx(&graph, "x"),
            Orientation::Both,
            &[EdgeKind::Calls],
            3,
        );
        assert_eq!(traversal.visits.len(), 2);
        let directions: Vec<Direction> = traversal.visits.iter().map(|v| v.direction).collect();
        assert!(directions.contains(&Direction::Incoming));
        assert!(directions.contains(&Direction::Outgoing));
    }

    #[test]
    fn test_shortest_path_prefers_fewer_hops() {
        // a → b → d and a → c → e → d
        let graph = chain_graph(&[("a", "b"), ("b", "d"), ("a", "c"), ("c", "e"), ("e", "d")]);
        let path = shortest_path(&graph, idx(&graph, "a"), idx(&graph, "d"), None, 10).unwrap();
        let names: Vec<&str> = path
            .iter()
            .map(|&n| graph.get(n).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_shortest_path_respects_via() {
        let graph = chain_graph(&[("a", "b")]);
        let a = idx(&graph, "a");
        let b = idx(&graph, "b");
        assert!(shortest_path(&graph, a, b, Some(EdgeKind::Calls), 10).is_some());
        assert!(shortest_path(&graph, a, b, Some(EdgeKind::Imports), 10).is_none());
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_hops(1), Severity::Direct);
        assert_eq!(Severity::from_hops(2), Severity::Transitive);
        assert_eq!(Severity::from_hops(3), Severity::Transitive);
        assert_eq!(Severity::from_hops(4), Severity::Distant);
    }
}
