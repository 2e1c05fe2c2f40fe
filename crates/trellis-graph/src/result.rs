//! Tabular query results.
//!
//! Every query, whatever its plan kind, produces the same shape: named
//! columns, row-major heterogeneous values, a row count and timing.
//! Empty results are valid; "not found" and depth truncation are flags
//! on the result, never faults.

use serde::Serialize;
use std::cmp::Ordering;
use std::time::Instant;

/// One cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Value {
    pub fn opt_str(value: Option<&str>) -> Self {
        match value {
            Some(s) => Value::Str(s.to_string()),
            None => Value::Null,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

/// Total order used for ORDER BY: null, then booleans, then numbers
/// (int/float compared numerically), then strings.
pub(crate) fn cmp_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

/// The uniform result of executing one plan.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// A traversal stopped at its depth bound; rows are a valid prefix.
    pub truncated: bool,
    /// Diagnostics such as "not found", never errors.
    pub warnings: Vec<String>,
}

impl QueryResult {
    pub(crate) fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            row_count: 0,
            execution_time_ms: 0,
            truncated: false,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub(crate) fn finish(mut self, started: Instant) -> Self {
        self.row_count = self.rows.len();
        self.execution_time_ms = started.elapsed().as_millis() as u64;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
