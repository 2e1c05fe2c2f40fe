//! Query lexer.
//!
//! Splits a query string into positioned tokens. The lexer is purely
//! structural; keyword and alias classification lives in the tables at
//! the bottom and is applied by the parser as grammar rules fire, so the
//! AST never carries surface syntax.

use crate::ast::{Field, Relation};
use crate::edge::EdgeKind;
use thiserror::Error;
use trellis_core::NodeKind;

/// A malformed query. Carries the offending token text and its byte
/// position in the input.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("syntax error at byte {position} near '{token}': {message}")]
pub struct ParseError {
    pub message: String,
    pub token: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, token: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            token: token.into(),
            position,
        }
    }
}

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare word: keyword, field, node reference, or unquoted value.
    Word(String),
    /// Quoted string.
    Str(String),
    Int(i64),
    Float(f64),
    Sym(Sym),
}

impl Token {
    /// The surface text used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Str(s) => format!("'{s}'"),
            Token::Int(n) => n.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Sym(s) => s.as_str().to_string(),
        }
    }
}

/// Punctuation and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sym {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `~`, the terse spelling of LIKE.
    Like,
    Star,
    Comma,
    Plus,
    Minus,
}

impl Sym {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sym::Eq => "=",
            Sym::Ne => "!=",
            Sym::Lt => "<",
            Sym::Le => "<=",
            Sym::Gt => ">",
            Sym::Ge => ">=",
            Sym::Like => "~",
            Sym::Star => "*",
            Sym::Comma => ",",
            Sym::Plus => "+",
            Sym::Minus => "-",
        }
    }
}

/// A token plus its byte position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '%')
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '%' | '-' | ':' | '\\')
}

/// Tokenizes a query string.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '\'' || c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            for (_, inner) in chars.by_ref() {
                if inner == c {
                    closed = true;
                    break;
                }
                value.push(inner);
            }
            if !closed {
                return Err(ParseError::new("unterminated string", value, position));
            }
            tokens.push(SpannedToken {
                token: Token::Str(value),
                position,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let mut text = String::new();
            let mut is_float = false;
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() {
                    text.push(d);
                    chars.next();
                } else if d == '.' && !is_float {
                    // Only a decimal point when digits follow; `10.` is
                    // not a number in this grammar.
                    let mut ahead = chars.clone();
                    ahead.next();
                    if ahead.peek().map(|&(_, n)| n.is_ascii_digit()).unwrap_or(false) {
                        is_float = true;
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            let token = if is_float {
                Token::Float(text.parse().map_err(|_| {
                    ParseError::new("invalid number", text.clone(), position)
                })?)
            } else {
                Token::Int(text.parse().map_err(|_| {
                    ParseError::new("invalid number", text.clone(), position)
                })?)
            };
            tokens.push(SpannedToken { token, position });
            continue;
        }

        if is_word_start(c) {
            let mut word = String::new();
            while let Some(&(_, w)) = chars.peek() {
                if is_word_continue(w) {
                    word.push(w);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(SpannedToken {
                token: Token::Word(word),
                position,
            });
            continue;
        }

        let sym = match c {
            '=' => {
                chars.next();
                Sym::Eq
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        Sym::Ne
                    }
                    _ => return Err(ParseError::new("expected '=' after '!'", "!", position)),
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    Sym::Le
                } else {
                    Sym::Lt
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    Sym::Ge
                } else {
                    Sym::Gt
                }
            }
            '~' => {
                chars.next();
                Sym::Like
            }
            '*' => {
                chars.next();
                Sym::Star
            }
            ',' => {
                chars.next();
                Sym::Comma
            }
            '+' => {
                chars.next();
                Sym::Plus
            }
            '-' => {
                chars.next();
                Sym::Minus
            }
            other => {
                return Err(ParseError::new(
                    "unexpected character",
                    other.to_string(),
                    position,
                ))
            }
        };
        tokens.push(SpannedToken {
            token: Token::Sym(sym),
            position,
        });
    }

    Ok(tokens)
}

// ── Keyword and alias tables ──
//
// Terse aliases expand here, as words are classified, so no later stage
// ever sees them.

pub(crate) fn node_kind_keyword(word: &str) -> Option<NodeKind> {
    match word.to_ascii_lowercase().as_str() {
        "module" | "mod" => Some(NodeKind::Module),
        "class" | "cls" => Some(NodeKind::Class),
        "function" | "fn" | "func" => Some(NodeKind::Function),
        "method" | "meth" => Some(NodeKind::Method),
        "parameter" | "param" => Some(NodeKind::Parameter),
        "import" | "imp" => Some(NodeKind::Import),
        "variable" | "var" => Some(NodeKind::Variable),
        "unresolved" => Some(NodeKind::Unresolved),
        _ => None,
    }
}

pub(crate) fn field_keyword(word: &str) -> Option<Field> {
    match word.to_ascii_lowercase().as_str() {
        "id" => Some(Field::Id),
        "name" | "n" => Some(Field::Name),
        "qualified_name" | "qn" => Some(Field::QualifiedName),
        "kind" => Some(Field::Kind),
        "file_path" | "file" | "fp" => Some(Field::FilePath),
        "line_start" | "ls" => Some(Field::LineStart),
        "line_end" | "le" => Some(Field::LineEnd),
        "complexity" | "c" => Some(Field::Complexity),
        "language" | "lang" => Some(Field::Language),
        _ => None,
    }
}

pub(crate) fn edge_kind_keyword(word: &str) -> Option<EdgeKind> {
    match word.to_ascii_lowercase().as_str() {
        "contains" => Some(EdgeKind::Contains),
        "imports" | "import" => Some(EdgeKind::Imports),
        "calls" | "call" => Some(EdgeKind::Calls),
        "inherits" | "extends" => Some(EdgeKind::Inherits),
        "references" | "ref" => Some(EdgeKind::References),
        _ => None,
    }
}

pub(crate) fn relation_keyword(word: &str) -> Option<Relation> {
    match word.to_ascii_lowercase().as_str() {
        "deps" => Some(Relation::Deps),
        "rdeps" => Some(Relation::Rdeps),
        "callers" => Some(Relation::Callers),
        "callees" => Some(Relation::Callees),
        "impact" => Some(Relation::Impact),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_numbers_symbols() {
        let tokens = tokenize("SELECT name, c FROM fn WHERE c >= 10").unwrap();
        let kinds: Vec<Token> = tokens.into_iter().map(|t| t.token).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Word("SELECT".into()),
                Token::Word("name".into()),
                Token::Sym(Sym::Comma),
                Token::Word("c".into()),
                Token::Word("FROM".into()),
                Token::Word("fn".into()),
                Token::Word("WHERE".into()),
                Token::Word("c".into()),
                Token::Sym(Sym::Ge),
                Token::Int(10),
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("show deps").unwrap();
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 5);
    }

    #[test]
    fn test_quoted_strings() {
        let tokens = tokenize("describe 'My Class' \"other\"").unwrap();
        assert_eq!(tokens[1].token, Token::Str("My Class".into()));
        assert_eq!(tokens[2].token, Token::Str("other".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let error = tokenize("describe 'oops").unwrap_err();
        assert_eq!(error.position, 9);
        assert!(error.message.contains("unterminated"));
    }

    #[test]
    fn test_words_can_carry_paths_and_wildcards() {
        let tokens = tokenize("src/app/main.py get_% d2").unwrap();
        assert_eq!(tokens[0].token, Token::Word("src/app/main.py".into()));
        assert_eq!(tokens[1].token, Token::Word("get_%".into()));
        assert_eq!(tokens[2].token, Token::Word("d2".into()));
    }

    #[test]
    fn test_float_and_int() {
        let tokens = tokenize("1.5 12").unwrap();
        assert_eq!(tokens[0].token, Token::Float(1.5));
        assert_eq!(tokens[1].token, Token::Int(12));
    }

    #[test]
    fn test_unexpected_character() {
        let error = tokenize("select ; from").unwrap_err();
        assert_eq!(error.token, ";");
        assert_eq!(error.position, 7);
    }

    #[test]
    fn test_bang_requires_equals() {
        let error = tokenize("where c ! 3").unwrap_err();
        assert!(error.message.contains("'='"));
    }

    #[test]
    fn test_alias_tables() {
        assert_eq!(node_kind_keyword("fn"), Some(NodeKind::Function));
        assert_eq!(node_kind_keyword("CLS"), Some(NodeKind::Class));
        assert_eq!(field_keyword("qn"), Some(Field::QualifiedName));
        assert_eq!(field_keyword("fp"), Some(Field::FilePath));
        assert_eq!(edge_kind_keyword("extends"), Some(EdgeKind::Inherits));
        assert_eq!(relation_keyword("rdeps"), Some(Relation::Rdeps));
        assert_eq!(node_kind_keyword("nonsense"), None);
    }
}
