//! Query executor.
//!
//! Runs a plan against one graph version and produces the uniform
//! tabular result. Traversals come back in deterministic order,
//! missing node references become warnings, and empty results are
//! ordinary results.

use crate::analysis;
use crate::ast::{CmpOp, Field, Filter, Literal, Order, Projection, Relation};
use crate::graph::CodeGraph;
use crate::lexer::ParseError;
use crate::planner::{
    self, AnalysisPlan, DirectPlan, Orientation, Plan, TraversalPlan, TraversalStep,
    MAX_TRAVERSAL_DEPTH,
};
use crate::result::{cmp_values, QueryResult, Value};
use crate::store::GraphStore;
use crate::traversal::{self, Severity};
use petgraph::Direction;
use std::cmp::Ordering;
use std::time::Instant;
use trellis_core::{CodeNode, NodeKind};

/// Executes one plan against a graph snapshot.
pub fn execute(plan: &Plan, graph: &CodeGraph) -> QueryResult {
    let started = Instant::now();
    let result = match plan {
        Plan::Direct(DirectPlan::Scan {
            projection,
            kind,
            filter,
            order,
            limit,
        }) => scan(graph, projection, *kind, filter.as_ref(), order.as_ref(), *limit),
        Plan::Direct(DirectPlan::Describe { target }) => describe(graph, target),
        Plan::Traversal(TraversalPlan { origin, step }) => match step {
            TraversalStep::Neighborhood {
                relation,
                orientation,
                edge_kinds,
                depth,
            } => neighborhood(graph, origin, *relation, *orientation, edge_kinds, *depth),
            TraversalStep::ShortestPath { to, via } => path(graph, origin, to, *via),
        },
        Plan::Analysis(AnalysisPlan::Cycles { scope }) => {
            analysis::cycles_result(graph, scope.as_deref())
        }
        Plan::Analysis(AnalysisPlan::Complexity) => analysis::complexity_result(graph),
        Plan::Analysis(AnalysisPlan::Coupling) => analysis::coupling_result(graph),
    };
    let result = result.finish(started);
    tracing::debug!(
        rows = result.row_count,
        ms = result.execution_time_ms,
        truncated = result.truncated,
        "query executed"
    );
    result
}

impl GraphStore {
    /// Parses, plans and executes one query string against the current
    /// graph version. The read guard is held for the whole execution, so
    /// the query sees a single consistent snapshot.
    pub fn query(&self, input: &str) -> Result<QueryResult, ParseError> {
        let statement = crate::parser::parse(input)?;
        let plan = planner::plan(statement);
        let graph = self.read();
        Ok(execute(&plan, &graph))
    }
}

// ── Direct plans ──

fn scan(
    graph: &CodeGraph,
    projection: &Projection,
    kind: NodeKind,
    filter: Option<&Filter>,
    order: Option<&Order>,
    limit: Option<usize>,
) -> QueryResult {
    let fields = planner::projected_fields(projection);
    let column_names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
    let mut result = QueryResult::new(&column_names);

    let mut nodes: Vec<&CodeNode> = graph
        .nodes_of_kind(kind)
        .into_iter()
        .filter_map(|index| graph.get(index))
        .collect();

    if let Some(filter) = filter {
        nodes.retain(|node| eval_filter(node, filter));
    }

    if let Some(order) = order {
        nodes.sort_by(|a, b| {
            let ordering = cmp_values(
                &field_value(a, order.field),
                &field_value(b, order.field),
            );
            let ordering = if order.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });
    }

    if let Some(limit) = limit {
        nodes.truncate(limit);
    }

    for node in nodes {
        result.push_row(fields.iter().map(|&field| field_value(node, field)).collect());
    }
    result
}

fn describe(graph: &CodeGraph, target: &str) -> QueryResult {
    let mut result = QueryResult::new(&["property", "value"]);
    let Some(node) = graph.lookup_ref(target).and_then(|index| graph.get(index)) else {
        result.warn(format!("not found: {target}"));
        return result;
    };
    let index = match graph.index_of(&node.id) {
        Some(index) => index,
        None => {
            result.warn(format!("not found: {target}"));
            return result;
        }
    };

    let pairs: Vec<(&str, Value)> = vec![
        ("id", Value::from(node.id.as_str())),
        ("name", Value::from(node.name.as_str())),
        ("qualified_name", Value::from(node.qualified_name.as_str())),
        ("kind", Value::from(node.kind.as_str())),
        ("file_path", Value::from(node.file.as_str())),
        ("line_start", Value::from(node.line_start)),
        ("line_end", Value::from(node.line_end)),
        ("complexity", Value::from(node.complexity)),
        ("language", Value::opt_str(node.language.as_deref())),
        ("docstring", Value::opt_str(node.docstring.as_deref())),
        (
            "metadata",
            if node.metadata.is_empty() {
                Value::Null
            } else {
                Value::Str(serde_json::to_string(&node.metadata).unwrap_or_default())
            },
        ),
        (
            "callers",
            Value::from(graph.edges_to(index, Some(crate::edge::EdgeKind::Calls)).len()),
        ),
        (
            "callees",
            Value::from(graph.edges_from(index, Some(crate::edge::EdgeKind::Calls)).len()),
        ),
        (
            "members",
            Value::from(
                graph
                    .edges_from(index, Some(crate::edge::EdgeKind::Contains))
                    .len(),
            ),
        ),
    ];
    for (property, value) in pairs {
        result.push_row(vec![Value::from(property), value]);
    }
    result
}

// ── Traversal plans ──

fn neighborhood(
    graph: &CodeGraph,
    origin_ref: &str,
    relation: Relation,
    orientation: Orientation,
    edge_kinds: &[crate::edge::EdgeKind],
    depth: usize,
) -> QueryResult {
    let impact = relation == Relation::Impact;
    let mut result = if impact {
        QueryResult::new(&[
            "name",
            "kind",
            "qualified_name",
            "file_path",
            "depth",
            "relationship",
            "direction",
            "severity",
        ])
    } else {
        QueryResult::new(&[
            "name",
            "kind",
            "qualified_name",
            "file_path",
            "depth",
            "relationship",
        ])
    };

    let Some(origin) = graph.lookup_ref(origin_ref) else {
        result.warn(format!("not found: {origin_ref}"));
        return result;
    };

    let traversal = traversal::neighborhood(graph, origin, orientation, edge_kinds, depth);
    result.truncated = traversal.truncated;

    for visit in traversal.visits {
        let Some(node) = graph.get(visit.node) else {
            continue;
        };
        let mut row = vec![
            Value::from(node.name.as_str()),
            Value::from(node.kind.as_str()),
            Value::from(node.qualified_name.as_str()),
            Value::from(node.file.as_str()),
            Value::from(visit.depth),
            Value::from(visit.entry.as_str()),
        ];
        if impact {
            row.push(Value::from(match visit.direction {
                Direction::Incoming => "upstream",
                Direction::Outgoing => "downstream",
            }));
            row.push(Value::from(Severity::from_hops(visit.depth).as_str()));
        }
        result.push_row(row);
    }
    result
}

fn path(
    graph: &CodeGraph,
    from_ref: &str,
    to_ref: &str,
    via: Option<crate::edge::EdgeKind>,
) -> QueryResult {
    let mut result = QueryResult::new(&["step", "name", "qualified_name", "kind", "file_path"]);

    let Some(from) = graph.lookup_ref(from_ref) else {
        result.warn(format!("not found: {from_ref}"));
        return result;
    };
    let Some(to) = graph.lookup_ref(to_ref) else {
        result.warn(format!("not found: {to_ref}"));
        return result;
    };

    match traversal::shortest_path(graph, from, to, via, MAX_TRAVERSAL_DEPTH) {
        Some(path) => {
            for (step, node_index) in path.into_iter().enumerate() {
                let Some(node) = graph.get(node_index) else {
                    continue;
                };
                result.push_row(vec![
                    Value::from(step),
                    Value::from(node.name.as_str()),
                    Value::from(node.qualified_name.as_str()),
                    Value::from(node.kind.as_str()),
                    Value::from(node.file.as_str()),
                ]);
            }
        }
        None => result.warn(format!("no path from {from_ref} to {to_ref}")),
    }
    result
}

// ── Filters ──

fn field_value(node: &CodeNode, field: Field) -> Value {
    match field {
        Field::Id => Value::from(node.id.as_str()),
        Field::Name => Value::from(node.name.as_str()),
        Field::QualifiedName => Value::from(node.qualified_name.as_str()),
        Field::Kind => Value::from(node.kind.as_str()),
        Field::FilePath => Value::from(node.file.as_str()),
        Field::LineStart => Value::from(node.line_start),
        Field::LineEnd => Value::from(node.line_end),
        Field::Complexity => Value::from(node.complexity),
        Field::Language => Value::opt_str(node.language.as_deref()),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

fn eval_filter(node: &CodeNode, filter: &Filter) -> bool {
    match filter {
        Filter::And(left, right) => eval_filter(node, left) && eval_filter(node, right),
        Filter::Or(left, right) => eval_filter(node, left) || eval_filter(node, right),
        Filter::Cmp { field, op, value } => {
            let lhs = field_value(node, *field);
            let rhs = literal_value(value);
            match op {
                CmpOp::Like => match (&lhs, &rhs) {
                    (Value::Str(text), Value::Str(pattern)) => like_match(pattern, text),
                    _ => false,
                },
                CmpOp::Eq => cmp_values(&lhs, &rhs) == Ordering::Equal,
                CmpOp::Ne => cmp_values(&lhs, &rhs) != Ordering::Equal,
                CmpOp::Lt => cmp_values(&lhs, &rhs) == Ordering::Less,
                CmpOp::Le => cmp_values(&lhs, &rhs) != Ordering::Greater,
                CmpOp::Gt => cmp_values(&lhs, &rhs) == Ordering::Greater,
                CmpOp::Ge => cmp_values(&lhs, &rhs) != Ordering::Less,
            }
        }
    }
}

/// Case-insensitive LIKE: `%` matches any run of characters.
fn like_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    if !pattern.contains('%') {
        return pattern == text;
    }

    let segments: Vec<&str> = pattern.split('%').collect();
    let mut pos = 0;
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(segment) {
                return false;
            }
            pos = segment.len();
        } else if i == last {
            let tail = &text[pos..];
            return tail.len() >= segment.len() && tail.ends_with(segment);
        } else {
            match text[pos..].find(segment) {
                Some(found) => pos += found + segment.len(),
                None => return false,
            }
        }
    }
    true
}
