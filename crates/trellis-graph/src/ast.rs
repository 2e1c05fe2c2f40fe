//! Query AST.
//!
//! The single normalized representation of a query. Both the verbose
//! SQL-like surface and the terse shorthand surface parse into these
//! types; nothing here remembers which syntax produced it.

use crate::edge::EdgeKind;
use serde::Serialize;
use trellis_core::NodeKind;

/// One parsed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Select(Select),
    Show(Show),
    FindPath(FindPath),
    Analyze(Analyze),
    Describe(Describe),
}

/// `SELECT <fields> FROM <type> [WHERE ...] [ORDER BY ...] [LIMIT n]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Select {
    pub projection: Projection,
    pub kind: NodeKind,
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

/// `SELECT *` or an explicit field list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Projection {
    All,
    Fields(Vec<Field>),
}

/// `SHOW <relation> OF <ref> [DEPTH n]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Show {
    pub relation: Relation,
    pub target: String,
    /// As written; the planner applies defaults and the hard cap.
    pub depth: Option<usize>,
}

/// Dependency-style shortcut relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Relation {
    /// What the node depends on (outgoing dependency edges).
    Deps,
    /// What depends on the node (incoming dependency edges).
    Rdeps,
    /// Incoming call edges.
    Callers,
    /// Outgoing call edges.
    Callees,
    /// Transitive blast radius in both directions.
    Impact,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deps => "deps",
            Self::Rdeps => "rdeps",
            Self::Callers => "callers",
            Self::Callees => "callees",
            Self::Impact => "impact",
        }
    }
}

/// `FIND PATH FROM <ref> TO <ref> [VIA <edge-type>]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindPath {
    pub from: String,
    pub to: String,
    pub via: Option<EdgeKind>,
}

/// `ANALYZE ...`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analyze {
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Analysis {
    /// Dependency cycles, optionally restricted to a file-path prefix.
    Cycles { scope: Option<String> },
    /// Complexity aggregates per node kind.
    Complexity,
    /// Fan-in/fan-out table.
    Coupling,
}

/// `DESCRIBE <ref>`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Describe {
    pub target: String,
}

/// A queryable node attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Field {
    Id,
    Name,
    QualifiedName,
    Kind,
    FilePath,
    LineStart,
    LineEnd,
    Complexity,
    Language,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::QualifiedName => "qualified_name",
            Self::Kind => "kind",
            Self::FilePath => "file_path",
            Self::LineStart => "line_start",
            Self::LineEnd => "line_end",
            Self::Complexity => "complexity",
            Self::Language => "language",
        }
    }

    /// Column order for `SELECT *`.
    pub fn all() -> &'static [Field] {
        &[
            Field::Id,
            Field::Name,
            Field::QualifiedName,
            Field::Kind,
            Field::FilePath,
            Field::LineStart,
            Field::LineEnd,
            Field::Complexity,
            Field::Language,
        ]
    }
}

/// `ORDER BY <field> [ASC|DESC]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub field: Field,
    pub descending: bool,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring/wildcard match; `%` matches any run of characters.
    Like,
}

/// A WHERE expression. AND binds tighter than OR.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Filter {
    Cmp {
        field: Field,
        op: CmpOp,
        value: Literal,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

/// A comparison value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}
