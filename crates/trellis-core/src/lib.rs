//! Trellis Core - Shared vocabulary for the code graph
//!
//! This crate defines the types that flow between the language front-ends
//! and the graph kernel: code entities (`CodeNode`), their kinds, and the
//! parsed-file records (`FileRecord`) that a front-end hands to the graph
//! builder.
//!
//! Nothing in this crate parses source code. Front-ends produce records;
//! the kernel consumes them.

mod node;
mod record;

pub use node::{node_id, CodeNode, NodeKind};
pub use record::{Definition, FileRecord, RawReference, RecordError, ReferenceKind};
