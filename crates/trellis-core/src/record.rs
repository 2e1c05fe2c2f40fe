//! Parsed-file records.
//!
//! A `FileRecord` is what a language front-end hands to the graph builder:
//! the definitions found in one file plus the raw reference strings
//! (call targets, import targets, base classes) still to be resolved.

use crate::node::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Validation failures for a parsed-file record.
///
/// A bad record fails only its own file's build; other files are
/// unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("record has an empty file path")]
    EmptyPath,

    #[error("definition {index} in {file} has an empty name")]
    EmptyName { file: String, index: usize },

    #[error("definition '{name}' in {file} has line_start {start} > line_end {end}")]
    InvertedSpan {
        file: String,
        name: String,
        start: u32,
        end: u32,
    },

    #[error("definition '{name}' in {file} has an empty reference target at line {line}")]
    EmptyReference {
        file: String,
        name: String,
        line: u32,
    },
}

/// What a textual reference means, as reported by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The definition calls the named function/method.
    Call,

    /// The definition imports the named module or symbol.
    Import,

    /// The class inherits from the named base.
    Inherit,

    /// Any other use of the name.
    Reference,
}

/// A raw, unresolved reference from a definition to a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReference {
    /// The referenced name as written in source, bare or qualified.
    pub target: String,

    pub kind: ReferenceKind,

    /// Line of the reference site, if known.
    pub line: Option<u32>,
}

impl RawReference {
    pub fn call(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: ReferenceKind::Call,
            line: None,
        }
    }

    pub fn import(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: ReferenceKind::Import,
            line: None,
        }
    }

    pub fn inherit(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: ReferenceKind::Inherit,
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// One definition extracted from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub kind: NodeKind,
    pub name: String,
    pub qualified_name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub complexity: u32,
    pub docstring: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub references: Vec<RawReference>,
}

impl Definition {
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            qualified_name: qualified_name.into(),
            line_start: 1,
            line_end: 1,
            complexity: 0,
            docstring: None,
            metadata: BTreeMap::new(),
            references: Vec::new(),
        }
    }

    pub fn function(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Function, name, qualified_name)
    }

    pub fn class(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Class, name, qualified_name)
    }

    pub fn method(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Method, name, qualified_name)
    }

    pub fn module(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Module, name, qualified_name)
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

    pub fn with_reference(mut self, reference: RawReference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Everything a front-end extracted from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path of the parsed file, relative to the project root.
    pub path: String,

    /// Source language tag, e.g. `python`, `csharp`.
    pub language: Option<String>,

    pub definitions: Vec<Definition>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: None,
            definitions: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_definition(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Checks the record before it reaches the graph builder.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.path.is_empty() {
            return Err(RecordError::EmptyPath);
        }

        for (index, def) in self.definitions.iter().enumerate() {
            if def.name.is_empty() {
                return Err(RecordError::EmptyName {
                    file: self.path.clone(),
                    index,
                });
            }
            if def.line_start > def.line_end {
                return Err(RecordError::InvertedSpan {
                    file: self.path.clone(),
                    name: def.name.clone(),
                    start: def.line_start,
                    end: def.line_end,
                });
            }
            for reference in &def.references {
                if reference.target.is_empty() {
                    return Err(RecordError::EmptyReference {
                        file: self.path.clone(),
                        name: def.name.clone(),
                        line: reference.line.unwrap_or(def.line_start),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_record() {
        let record = FileRecord::new("a.py")
            .with_language("python")
            .with_definition(
                Definition::function("foo", "a.foo")
                    .with_lines(1, 5)
                    .with_reference(RawReference::call("bar").at_line(3)),
            );
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_empty_path_rejected() {
        let record = FileRecord::new("");
        assert_eq!(record.validate(), Err(RecordError::EmptyPath));
    }

    #[test]
    fn test_inverted_span_rejected() {
        let record =
            FileRecord::new("a.py").with_definition(Definition::function("f", "f").with_lines(9, 3));
        assert!(matches!(
            record.validate(),
            Err(RecordError::InvertedSpan { start: 9, end: 3, .. })
        ));
    }

    #[test]
    fn test_empty_reference_rejected() {
        let record = FileRecord::new("a.py").with_definition(
            Definition::function("f", "f").with_reference(RawReference::call("")),
        );
        assert!(matches!(
            record.validate(),
            Err(RecordError::EmptyReference { .. })
        ));
    }
}
