//! Whole-graph analyses.
//!
//! Computations that do not fit a bounded traversal: dependency-cycle
//! detection over strongly connected components, complexity aggregates,
//! and the fan-in/fan-out coupling table. All output is deterministically
//! ordered so repeated runs agree.

use crate::graph::{CodeGraph, NodeId};
use crate::result::{QueryResult, Value};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet};
use trellis_core::NodeKind;

/// A dependency cycle as an ordered list of node IDs, starting from the
/// lexicographically smallest member.
pub type Cycle = Vec<String>;

/// Finds dependency cycles, optionally restricted to files under a path
/// prefix. Contains edges are hierarchy, not dependency, and are ignored.
pub fn find_cycles(graph: &CodeGraph, scope: Option<&str>) -> Vec<Cycle> {
    // Project the dependency subgraph into a scratch graph; petgraph's
    // SCC search then runs over exactly the edges that matter.
    let mut scratch: DiGraph<NodeId, ()> = DiGraph::new();
    let mut mapping: HashMap<NodeId, petgraph::graph::NodeIndex> = HashMap::new();

    for index in graph.node_indexes() {
        let Some(node) = graph.get(index) else {
            continue;
        };
        if node.is_placeholder() {
            continue;
        }
        if let Some(prefix) = scope {
            if !node.file.starts_with(prefix) {
                continue;
            }
        }
        mapping.insert(index, scratch.add_node(index));
    }

    let mut self_loops: HashSet<NodeId> = HashSet::new();
    for index in graph.node_indexes() {
        let Some(&from) = mapping.get(&index) else {
            continue;
        };
        for edge_ref in graph.graph.edges_directed(index, Direction::Outgoing) {
            if !edge_ref.weight().kind.is_dependency() {
                continue;
            }
            let Some(&to) = mapping.get(&edge_ref.target()) else {
                continue;
            };
            if from == to {
                self_loops.insert(index);
            }
            scratch.add_edge(from, to, ());
        }
    }

    let mut cycles: Vec<Cycle> = tarjan_scc(&scratch)
        .into_iter()
        .filter_map(|component| {
            let members: Vec<NodeId> = component.iter().map(|&i| scratch[i]).collect();
            if members.len() == 1 && !self_loops.contains(&members[0]) {
                return None;
            }
            Some(order_cycle(graph, members))
        })
        .collect();

    cycles.sort_by(|a, b| a.first().cmp(&b.first()).then_with(|| a.len().cmp(&b.len())));
    cycles
}

/// Orders one strongly connected component: start at the smallest ID and
/// greedily follow the smallest-ID successor still inside the component.
fn order_cycle(graph: &CodeGraph, members: Vec<NodeId>) -> Cycle {
    let member_set: HashSet<NodeId> = members.iter().copied().collect();
    let id_of = |node: NodeId| {
        graph
            .get(node)
            .map(|n| n.id.clone())
            .unwrap_or_default()
    };

    let mut remaining: Vec<NodeId> = members;
    remaining.sort_by_key(|&n| id_of(n));

    let start = remaining[0];
    let mut ordered = vec![start];
    let mut seen: HashSet<NodeId> = HashSet::from([start]);
    let mut current = start;

    loop {
        let next = graph
            .graph
            .edges_directed(current, Direction::Outgoing)
            .filter(|edge_ref| edge_ref.weight().kind.is_dependency())
            .map(|edge_ref| edge_ref.target())
            .filter(|target| member_set.contains(target) && !seen.contains(target))
            .min_by_key(|&target| id_of(target));
        match next {
            Some(node) => {
                seen.insert(node);
                ordered.push(node);
                current = node;
            }
            None => break,
        }
    }

    // Members the walk could not thread through still belong to the
    // component; append them in ID order.
    for node in remaining {
        if !seen.contains(&node) {
            ordered.push(node);
        }
    }

    ordered.into_iter().map(id_of).collect()
}

/// `ANALYZE CYCLES`: one row per cycle.
pub(crate) fn cycles_result(graph: &CodeGraph, scope: Option<&str>) -> QueryResult {
    let mut result = QueryResult::new(&["cycle", "length", "members"]);
    for (index, cycle) in find_cycles(graph, scope).into_iter().enumerate() {
        result.push_row(vec![
            Value::from(index),
            Value::from(cycle.len()),
            Value::Str(cycle.join(" -> ")),
        ]);
    }
    result
}

/// `ANALYZE COMPLEXITY`: aggregates per node kind.
pub(crate) fn complexity_result(graph: &CodeGraph) -> QueryResult {
    struct Bucket {
        count: usize,
        total: u64,
        max: u32,
        max_name: String,
    }

    let mut buckets: BTreeMap<NodeKind, Bucket> = BTreeMap::new();
    for node in graph.nodes() {
        if node.is_placeholder() {
            continue;
        }
        let bucket = buckets.entry(node.kind).or_insert(Bucket {
            count: 0,
            total: 0,
            max: 0,
            max_name: String::new(),
        });
        bucket.count += 1;
        bucket.total += u64::from(node.complexity);
        // Ties go to the lexicographically smaller name.
        if node.complexity > bucket.max
            || (node.complexity == bucket.max
                && (bucket.max_name.is_empty() || node.name < bucket.max_name))
        {
            bucket.max = node.complexity;
            bucket.max_name = node.name.clone();
        }
    }

    let mut result = QueryResult::new(&[
        "kind",
        "count",
        "avg_complexity",
        "max_complexity",
        "max_node",
    ]);
    for (kind, bucket) in buckets {
        let avg = bucket.total as f64 / bucket.count as f64;
        result.push_row(vec![
            Value::from(kind.as_str()),
            Value::from(bucket.count),
            Value::Float((avg * 100.0).round() / 100.0),
            Value::from(bucket.max),
            Value::Str(bucket.max_name),
        ]);
    }
    result
}

/// `ANALYZE COUPLING`: dependency fan-in/fan-out per node, highest
/// total first.
pub(crate) fn coupling_result(graph: &CodeGraph) -> QueryResult {
    let mut rows: Vec<(String, String, String, String, usize, usize)> = Vec::new();
    for index in graph.node_indexes() {
        let Some(node) = graph.get(index) else {
            continue;
        };
        if node.is_placeholder() {
            continue;
        }
        let fan_in = dependency_degree(graph, index, Direction::Incoming);
        let fan_out = dependency_degree(graph, index, Direction::Outgoing);
        if fan_in + fan_out == 0 {
            continue;
        }
        rows.push((
            node.id.clone(),
            node.name.clone(),
            node.qualified_name.clone(),
            node.kind.as_str().to_string(),
            fan_in,
            fan_out,
        ));
    }

    rows.sort_by(|a, b| {
        (b.4 + b.5)
            .cmp(&(a.4 + a.5))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut result = QueryResult::new(&["name", "qualified_name", "kind", "fan_in", "fan_out"]);
    for (_, name, qualified, kind, fan_in, fan_out) in rows {
        result.push_row(vec![
            Value::Str(name),
            Value::Str(qualified),
            Value::Str(kind),
            Value::from(fan_in),
            Value::from(fan_out),
        ]);
    }
    result
}

fn dependency_degree(graph: &CodeGraph, index: NodeId, direction: Direction) -> usize {
    graph
        .graph
        .edges_directed(index, direction)
        .filter(|edge_ref| edge_ref.weight().kind.is_dependency())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{EdgeKind, EdgeRecord};
    use trellis_core::CodeNode;

    fn cyclic_graph(edges: &[(&str, &str)], file: &str) -> CodeGraph {
        let mut names: Vec<&str> = edges.iter().flat_map(|(a, b)| [*a, *b]).collect();
        names.sort();
        names.dedup();
        let nodes: Vec<CodeNode> = names
            .iter()
            .map(|n| CodeNode::new(NodeKind::Function, *n, *n, file).with_lines(1, 1))
            .collect();
        let records: Vec<EdgeRecord> = edges
            .iter()
            .map(|(a, b)| {
                EdgeRecord::new(
                    format!("function:{file}:{a}"),
                    format!("function:{file}:{b}"),
                    EdgeKind::Calls,
                )
            })
            .collect();
        let mut graph = CodeGraph::new();
        graph.replace_file(file, nodes, records);
        graph
    }

    #[test]
    fn test_simple_cycle_found_and_rotated() {
        // z → a → z: the cycle starts from its smallest member.
        let graph = cyclic_graph(&[("z", "a"), ("a", "z")], "t.py");
        let cycles = find_cycles(&graph, None);
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0],
            vec![
                "function:t.py:a".to_string(),
                "function:t.py:z".to_string()
            ]
        );
    }

    #[test]
    fn test_three_node_cycle_is_walk_ordered() {
        let graph = cyclic_graph(&[("b", "c"), ("c", "a"), ("a", "b")], "t.py");
        let cycles = find_cycles(&graph, None);
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0],
            vec![
                "function:t.py:a".to_string(),
                "function:t.py:b".to_string(),
                "function:t.py:c".to_string()
            ]
        );
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let graph = cyclic_graph(&[("a", "b"), ("b", "c")], "t.py");
        assert!(find_cycles(&graph, None).is_empty());
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let graph = cyclic_graph(&[("rec", "rec")], "t.py");
        let cycles = find_cycles(&graph, None);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["function:t.py:rec".to_string()]);
    }

    #[test]
    fn test_cycles_are_deterministic_across_runs() {
        let graph = cyclic_graph(
            &[("a", "b"), ("b", "a"), ("x", "y"), ("y", "x")],
            "t.py",
        );
        let first = find_cycles(&graph, None);
        for _ in 0..5 {
            assert_eq!(find_cycles(&graph, None), first);
        }
        assert_eq!(first.len(), 2);
        // Sorted by first member: the a/b cycle comes before x/y.
        assert!(first[0][0] < first[1][0]);
    }

    #[test]
    fn test_scope_restricts_cycles() {
        let mut graph = cyclic_graph(&[("a", "b"), ("b", "a")], "src/t.py");
        let other = cyclic_graph(&[("p", "q"), ("q", "p")], "lib/u.py");
        // Merge the second file into the first graph.
        let nodes: Vec<CodeNode> = other.nodes().cloned().collect();
        let edges = other.export_edges();
        graph.replace_file("lib/u.py", nodes, edges);

        assert_eq!(find_cycles(&graph, None).len(), 2);
        assert_eq!(find_cycles(&graph, Some("src/")).len(), 1);
        assert_eq!(find_cycles(&graph, Some("vendor/")).len(), 0);
    }

    #[test]
    fn test_complexity_aggregates() {
        let mut graph = CodeGraph::new();
        let nodes = vec![
            CodeNode::new(NodeKind::Function, "low", "low", "t.py")
                .with_lines(1, 1)
                .with_complexity(2),
            CodeNode::new(NodeKind::Function, "high", "high", "t.py")
                .with_lines(2, 2)
                .with_complexity(10),
        ];
        graph.replace_file("t.py", nodes, vec![]);

        let result = complexity_result(&graph);
        let function_row = result
            .rows
            .iter()
            .find(|row| row[0] == Value::Str("function".into()))
            .unwrap();
        assert_eq!(function_row[1], Value::Int(2));
        assert_eq!(function_row[2], Value::Float(6.0));
        assert_eq!(function_row[3], Value::Int(10));
        assert_eq!(function_row[4], Value::Str("high".into()));
    }

    #[test]
    fn test_coupling_orders_by_total_degree() {
        let graph = cyclic_graph(&[("hub", "a"), ("hub", "b"), ("c", "hub")], "t.py");
        let result = coupling_result(&graph);
        assert_eq!(result.rows[0][0], Value::Str("hub".into()));
        assert_eq!(result.rows[0][3], Value::Int(1)); // fan_in
        assert_eq!(result.rows[0][4], Value::Int(2)); // fan_out
    }
}
