//! Code entity types.
//!
//! A `CodeNode` is one entity in the graph: a module, class, function and
//! so on. Node IDs are deterministic strings derived from the entity's
//! kind and qualified location, so re-indexing unchanged source yields the
//! same IDs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of a code entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source file / module.
    Module,

    /// A class, struct or similar type definition.
    Class,

    /// A free function.
    Function,

    /// A method bound to a class.
    Method,

    /// A function or method parameter.
    Parameter,

    /// An import statement.
    Import,

    /// A module-level variable or constant.
    Variable,

    /// Placeholder target for a reference that could not be resolved.
    /// Retained so the edge survives until the real target appears.
    Unresolved,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Parameter => "parameter",
            Self::Import => "import",
            Self::Variable => "variable",
            Self::Unresolved => "unresolved",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derives the deterministic ID for a node.
///
/// The ID is `kind:file:qualified_name`. The builder appends a line suffix
/// only when two definitions in the same file would otherwise collide
/// (overloads), so unchanged source always produces identical IDs.
pub fn node_id(kind: NodeKind, file: &str, qualified_name: &str) -> String {
    format!("{}:{}:{}", kind.as_str(), file, qualified_name)
}

/// A code entity in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    /// Deterministic string ID, unique within one graph version.
    pub id: String,

    /// The entity kind.
    pub kind: NodeKind,

    /// Short name, e.g. `validate`.
    pub name: String,

    /// Dotted path, e.g. `auth.UserService.validate`. Not necessarily
    /// unique across the graph; disambiguation is the resolver's job.
    pub qualified_name: String,

    /// File path the entity is defined in.
    pub file: String,

    /// First line of the definition (1-based).
    pub line_start: u32,

    /// Last line of the definition.
    pub line_end: u32,

    /// Cyclomatic complexity as computed by the front-end. Stored
    /// verbatim; the kernel never recomputes it.
    pub complexity: u32,

    /// Docstring, if the front-end extracted one.
    pub docstring: Option<String>,

    /// Source language tag, e.g. `python`. Used by the resolver to keep
    /// same-named entities from different ecosystems apart.
    pub language: Option<String>,

    /// Open side-map for kind-specific extras: decorators, base-class
    /// text, return types. A fixed envelope plus this map avoids a
    /// subtype per node kind.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CodeNode {
    /// Creates a node with a derived ID and empty optional fields.
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let qualified_name = qualified_name.into();
        let file = file.into();
        Self {
            id: node_id(kind, &file, &qualified_name),
            kind,
            name,
            qualified_name,
            file,
            line_start: 0,
            line_end: 0,
            complexity: 0,
            docstring: None,
            language: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates the placeholder target for a dangling edge.
    ///
    /// Placeholders are attributed to the *referencing* file, so rebuilding
    /// that file replaces them along with the rest of its nodes.
    pub fn placeholder(reference: &str, referencing_file: &str) -> Self {
        let mut node = Self::new(NodeKind::Unresolved, reference, reference, referencing_file);
        node.id = format!("unresolved:{}:{}", referencing_file, reference);
        node
    }

    /// True for placeholder targets of dangling edges.
    pub fn is_placeholder(&self) -> bool {
        self.kind == NodeKind::Unresolved
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.line_start = start;
        self.line_end = end;
        self
    }

    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = CodeNode::new(NodeKind::Function, "foo", "pkg.foo", "pkg/a.py");
        let b = CodeNode::new(NodeKind::Function, "foo", "pkg.foo", "pkg/a.py");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "function:pkg/a.py:pkg.foo");
    }

    #[test]
    fn test_id_varies_by_kind_and_location() {
        let func = CodeNode::new(NodeKind::Function, "run", "run", "a.py");
        let class = CodeNode::new(NodeKind::Class, "run", "run", "a.py");
        let other_file = CodeNode::new(NodeKind::Function, "run", "run", "b.py");
        assert_ne!(func.id, class.id);
        assert_ne!(func.id, other_file.id);
    }

    #[test]
    fn test_placeholder_attribution() {
        let node = CodeNode::placeholder("missing_fn", "src/main.py");
        assert!(node.is_placeholder());
        assert_eq!(node.file, "src/main.py");
        assert_eq!(node.id, "unresolved:src/main.py:missing_fn");
    }

    #[test]
    fn test_builder_methods() {
        let node = CodeNode::new(NodeKind::Method, "validate", "User.validate", "user.py")
            .with_lines(10, 25)
            .with_complexity(7)
            .with_docstring("Checks credentials.")
            .with_language("python")
            .with_metadata("decorators", serde_json::json!(["staticmethod"]));

        assert_eq!(node.line_start, 10);
        assert_eq!(node.line_end, 25);
        assert_eq!(node.complexity, 7);
        assert_eq!(node.language.as_deref(), Some("python"));
        assert!(node.metadata.contains_key("decorators"));
    }
}
