//! Trellis Graph - The code graph kernel
//!
//! This crate is the queryable heart of Trellis: a typed node/edge store
//! with incremental per-file replacement, a symbol resolver that turns
//! textual references into edges, and a small query engine (parser,
//! planner, executor) for structural questions about a codebase.
//!
//! # Architecture
//!
//! The graph uses petgraph internally with indexes for ID, name,
//! qualified-name and file lookups. `GraphStore` wraps one graph version
//! behind a reader/writer lock and persists it to sled, keyed by project.
//! `GraphBuilder` turns parsed-file records into batches, resolving
//! references through `Resolver`; what cannot be resolved survives as a
//! dangling edge and heals on a later build. Queries flow through
//! `parse` → `plan` → `execute` and always produce a `QueryResult`.
//!
//! # Example
//!
//! ```no_run
//! use trellis_graph::{GraphBuilder, GraphStore};
//! use trellis_core::{Definition, FileRecord, RawReference};
//!
//! let store = GraphStore::in_memory("demo");
//! let builder = GraphBuilder::new(&store);
//!
//! builder.build_file(
//!     &FileRecord::new("app.py").with_definition(
//!         Definition::function("main", "app.main")
//!             .with_reference(RawReference::call("run")),
//!     ),
//! )?;
//!
//! let result = store.query("SHOW CALLERS OF run")?;
//! for row in &result.rows {
//!     println!("{row:?}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod analysis;
mod ast;
mod builder;
mod edge;
mod executor;
mod graph;
mod lexer;
mod parser;
mod planner;
mod resolver;
mod result;
mod store;
mod traversal;

pub use analysis::{find_cycles, Cycle};
pub use ast::{
    Analysis, Analyze, CmpOp, Describe, Field, Filter, FindPath, Literal, Order, Projection,
    Relation, Select, Show, Statement,
};
pub use builder::{BuildError, BuildReport, GraphBuilder, UnresolvedReference};
pub use edge::{Edge, EdgeKind, EdgeRecord};
pub use executor::execute;
pub use graph::{CodeGraph, GraphStats, NodeId};
pub use lexer::ParseError;
pub use parser::parse;
pub use planner::{
    plan, AnalysisPlan, DirectPlan, Orientation, Plan, TraversalPlan, TraversalStep,
    DEFAULT_IMPACT_DEPTH, DEFAULT_SHOW_DEPTH, MAX_TRAVERSAL_DEPTH,
};
pub use resolver::{Resolution, Resolver};
pub use result::{QueryResult, Value};
pub use store::{GraphStore, StoreError};
pub use traversal::{bfs, neighborhood, shortest_path, Severity, Traversal, Visit};
