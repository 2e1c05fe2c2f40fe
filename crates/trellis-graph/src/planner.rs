//! Query planner.
//!
//! Lowers a `Statement` into exactly one of three plan kinds: a direct
//! store scan, a bounded graph traversal, or a whole-graph analysis.
//! SELECT and DESCRIBE are always direct; every SHOW and FIND PATH is a
//! traversal even at depth 1, for implementation uniformity; ANALYZE is
//! always an analysis.

use crate::ast::{
    Analysis, Field, Filter, Order, Projection, Relation, Statement,
};
use crate::edge::EdgeKind;
use serde::Serialize;
use trellis_core::NodeKind;

/// Default depth for deps/rdeps/callers/callees.
pub const DEFAULT_SHOW_DEPTH: usize = 1;

/// Default depth for impact: deep enough to cover the transitive band.
pub const DEFAULT_IMPACT_DEPTH: usize = 3;

/// Hard bound on any traversal, so cyclic graphs always terminate.
pub const MAX_TRAVERSAL_DEPTH: usize = 25;

/// The executable lowering of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Plan {
    Direct(DirectPlan),
    Traversal(TraversalPlan),
    Analysis(AnalysisPlan),
}

/// Single store scan or point lookup; no traversal involved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DirectPlan {
    Scan {
        projection: Projection,
        kind: NodeKind,
        filter: Option<Filter>,
        order: Option<Order>,
        limit: Option<usize>,
    },
    Describe {
        target: String,
    },
}

/// Which way edges are followed from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    /// Along edge direction (dependencies, callees).
    Forward,
    /// Against edge direction (dependents, callers).
    Reverse,
    /// Both ways (impact blast radius).
    Both,
}

/// Depth-bounded BFS over edges of the given kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraversalPlan {
    pub origin: String,
    pub step: TraversalStep,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TraversalStep {
    Neighborhood {
        relation: Relation,
        orientation: Orientation,
        edge_kinds: Vec<EdgeKind>,
        depth: usize,
    },
    ShortestPath {
        to: String,
        via: Option<EdgeKind>,
    },
}

/// Whole-graph computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AnalysisPlan {
    Cycles { scope: Option<String> },
    Complexity,
    Coupling,
}

/// Lowers an AST statement into its plan.
pub fn plan(statement: Statement) -> Plan {
    match statement {
        Statement::Select(select) => Plan::Direct(DirectPlan::Scan {
            projection: select.projection,
            kind: select.kind,
            filter: select.filter,
            order: select.order,
            limit: select.limit,
        }),
        Statement::Describe(describe) => Plan::Direct(DirectPlan::Describe {
            target: describe.target,
        }),
        Statement::Show(show) => {
            let (orientation, edge_kinds, default_depth) = match show.relation {
                Relation::Deps => (
                    Orientation::Forward,
                    EdgeKind::dependency_kinds().to_vec(),
                    DEFAULT_SHOW_DEPTH,
                ),
                Relation::Rdeps => (
                    Orientation::Reverse,
                    EdgeKind::dependency_kinds().to_vec(),
                    DEFAULT_SHOW_DEPTH,
                ),
                Relation::Callers => {
                    (Orientation::Reverse, vec![EdgeKind::Calls], DEFAULT_SHOW_DEPTH)
                }
                Relation::Callees => {
                    (Orientation::Forward, vec![EdgeKind::Calls], DEFAULT_SHOW_DEPTH)
                }
                Relation::Impact => (
                    Orientation::Both,
                    EdgeKind::dependency_kinds().to_vec(),
                    DEFAULT_IMPACT_DEPTH,
                ),
            };
            let depth = show.depth.unwrap_or(default_depth).min(MAX_TRAVERSAL_DEPTH);
            Plan::Traversal(TraversalPlan {
                origin: show.target,
                step: TraversalStep::Neighborhood {
                    relation: show.relation,
                    orientation,
                    edge_kinds,
                    depth,
                },
            })
        }
        Statement::FindPath(path) => Plan::Traversal(TraversalPlan {
            origin: path.from,
            step: TraversalStep::ShortestPath {
                to: path.to,
                via: path.via,
            },
        }),
        Statement::Analyze(analyze) => Plan::Analysis(match analyze.analysis {
            Analysis::Cycles { scope } => AnalysisPlan::Cycles { scope },
            Analysis::Complexity => AnalysisPlan::Complexity,
            Analysis::Coupling => AnalysisPlan::Coupling,
        }),
    }
}

/// Fields projected by a scan, in column order.
pub(crate) fn projected_fields(projection: &Projection) -> Vec<Field> {
    match projection {
        Projection::All => Field::all().to_vec(),
        Projection::Fields(fields) => fields.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn plan_of(query: &str) -> Plan {
        plan(parse(query).unwrap())
    }

    #[test]
    fn test_select_is_always_direct() {
        assert!(matches!(
            plan_of("SELECT name FROM fn"),
            Plan::Direct(DirectPlan::Scan { .. })
        ));
        assert!(matches!(
            plan_of("SELECT * FROM cls WHERE c > 2 ORDER BY name LIMIT 3"),
            Plan::Direct(DirectPlan::Scan { .. })
        ));
    }

    #[test]
    fn test_show_is_traversal_even_at_depth_one() {
        let Plan::Traversal(traversal) = plan_of("SHOW CALLERS OF foo DEPTH 1") else {
            panic!("expected traversal");
        };
        let TraversalStep::Neighborhood {
            orientation,
            edge_kinds,
            depth,
            ..
        } = traversal.step
        else {
            panic!("expected neighborhood");
        };
        assert_eq!(orientation, Orientation::Reverse);
        assert_eq!(edge_kinds, vec![EdgeKind::Calls]);
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_show_depth_defaults() {
        let Plan::Traversal(deps) = plan_of("deps foo") else {
            panic!("expected traversal");
        };
        let TraversalStep::Neighborhood { depth, .. } = deps.step else {
            panic!("expected neighborhood");
        };
        assert_eq!(depth, DEFAULT_SHOW_DEPTH);

        let Plan::Traversal(impact) = plan_of("impact foo") else {
            panic!("expected traversal");
        };
        let TraversalStep::Neighborhood {
            depth, orientation, ..
        } = impact.step
        else {
            panic!("expected neighborhood");
        };
        assert_eq!(depth, DEFAULT_IMPACT_DEPTH);
        assert_eq!(orientation, Orientation::Both);
    }

    #[test]
    fn test_depth_is_capped() {
        let Plan::Traversal(traversal) = plan_of("SHOW DEPS OF foo DEPTH 9999") else {
            panic!("expected traversal");
        };
        let TraversalStep::Neighborhood { depth, .. } = traversal.step else {
            panic!("expected neighborhood");
        };
        assert_eq!(depth, MAX_TRAVERSAL_DEPTH);
    }

    #[test]
    fn test_find_path_is_traversal() {
        let Plan::Traversal(traversal) = plan_of("FIND PATH FROM a TO b VIA imports") else {
            panic!("expected traversal");
        };
        assert_eq!(traversal.origin, "a");
        assert_eq!(
            traversal.step,
            TraversalStep::ShortestPath {
                to: "b".to_string(),
                via: Some(EdgeKind::Imports),
            }
        );
    }

    #[test]
    fn test_analyze_is_analysis() {
        assert!(matches!(
            plan_of("ANALYZE CYCLES"),
            Plan::Analysis(AnalysisPlan::Cycles { scope: None })
        ));
        assert!(matches!(
            plan_of("ANALYZE COUPLING"),
            Plan::Analysis(AnalysisPlan::Coupling)
        ));
    }
}
