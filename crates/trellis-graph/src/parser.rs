//! Query parser.
//!
//! Hand-written recursive descent over the lexer's tokens. Accepts the
//! verbose SQL-like surface and the terse shorthand surface; both
//! produce the same `Statement` values. Terse aliases expand through
//! the lexer tables as words are classified, so equivalence holds by
//! construction.

use crate::ast::{
    Analysis, Analyze, CmpOp, Describe, Field, Filter, FindPath, Literal, Order, Projection,
    Relation, Select, Show, Statement,
};
use crate::edge::EdgeKind;
use crate::lexer::{
    edge_kind_keyword, field_keyword, node_kind_keyword, relation_keyword, tokenize, ParseError,
    SpannedToken, Sym, Token,
};
use trellis_core::NodeKind;

/// Parses one query string into the normalized AST.
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty query", "", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let statement = parser.parse_statement()?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::new(
            "unexpected trailing input",
            extra.token.describe(),
            extra.position,
        ));
    }
    Ok(statement)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map(|t| t.position).unwrap_or(self.end)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self
            .peek()
            .map(|t| t.token.describe())
            .unwrap_or_else(|| "<end of query>".to_string());
        ParseError::new(message, token, self.position())
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Some(SpannedToken {
                token: Token::Word(w),
                ..
            }) => Some(w.as_str()),
            _ => None,
        }
    }

    /// Consumes the next token when it is the given keyword.
    fn eat_word(&mut self, keyword: &str) -> bool {
        if self
            .peek_word()
            .map(|w| w.eq_ignore_ascii_case(keyword))
            .unwrap_or(false)
        {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_word(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{}'", keyword.to_uppercase())))
        }
    }

    fn eat_sym(&mut self, sym: Sym) -> bool {
        if matches!(self.peek(), Some(SpannedToken { token: Token::Sym(s), .. }) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_int(&mut self, what: &str) -> Result<usize, ParseError> {
        match self.peek() {
            Some(SpannedToken {
                token: Token::Int(n),
                ..
            }) if *n >= 0 => {
                let value = *n as usize;
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.error_here(format!("expected a number for {what}"))),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let Some(first) = self.peek_word().map(str::to_ascii_lowercase) else {
            return Err(self.error_here("expected a statement keyword"));
        };
        match first.as_str() {
            "select" => self.parse_select(),
            "show" => self.parse_show_verbose(),
            "find" => self.parse_find_path(),
            "analyze" => self.parse_analyze(),
            "describe" => self.parse_describe(),
            word => match relation_keyword(word) {
                Some(relation) => self.parse_show_terse(relation),
                None => Err(self.error_here(
                    "expected SELECT, SHOW, FIND, ANALYZE, DESCRIBE or a relation shorthand",
                )),
            },
        }
    }

    // ── SELECT ──

    fn parse_select(&mut self) -> Result<Statement, ParseError> {
        self.advance();

        let projection = if self.eat_sym(Sym::Star) {
            Projection::All
        } else {
            let mut fields = vec![self.parse_field()?];
            while self.eat_sym(Sym::Comma) {
                fields.push(self.parse_field()?);
            }
            Projection::Fields(fields)
        };

        self.expect_word("from")?;
        let kind = self.parse_node_kind()?;

        let filter = if self.eat_word("where") {
            Some(self.parse_or()?)
        } else {
            None
        };

        let order = self.parse_order()?;

        let limit = if self.eat_word("limit") {
            Some(self.expect_int("LIMIT")?)
        } else if let Some(SpannedToken {
            token: Token::Int(n),
            ..
        }) = self.peek()
        {
            // Terse form: a bare trailing number is the limit.
            let value = *n;
            if value < 0 {
                return Err(self.error_here("limit must be non-negative"));
            }
            self.pos += 1;
            Some(value as usize)
        } else {
            None
        };

        Ok(Statement::Select(Select {
            projection,
            kind,
            filter,
            order,
            limit,
        }))
    }

    fn parse_order(&mut self) -> Result<Option<Order>, ParseError> {
        if self.eat_word("order") {
            self.expect_word("by")?;
            let field = self.parse_field()?;
            let descending = if self.eat_word("desc") {
                true
            } else {
                self.eat_word("asc");
                false
            };
            return Ok(Some(Order { field, descending }));
        }

        if self.eat_word("sort") {
            // `sort -c` sorts descending, `sort +c` / `sort c` ascending.
            let mut descending = false;
            if self.eat_sym(Sym::Minus) {
                descending = true;
            } else {
                self.eat_sym(Sym::Plus);
            }
            let field = self.parse_field()?;
            if self.eat_word("desc") {
                descending = true;
            } else if self.eat_word("asc") {
                descending = false;
            }
            return Ok(Some(Order { field, descending }));
        }

        Ok(None)
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        match self.peek_word().and_then(field_keyword) {
            Some(field) => {
                self.pos += 1;
                Ok(field)
            }
            None => Err(self.error_here("expected a field name")),
        }
    }

    fn parse_node_kind(&mut self) -> Result<NodeKind, ParseError> {
        match self.peek_word().and_then(node_kind_keyword) {
            Some(kind) => {
                self.pos += 1;
                Ok(kind)
            }
            None => Err(self.error_here("expected a node type")),
        }
    }

    // ── WHERE: OR over AND over comparisons ──

    fn parse_or(&mut self) -> Result<Filter, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat_word("or") {
            let right = self.parse_and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Filter, ParseError> {
        let mut left = self.parse_cmp()?;
        while self.eat_word("and") {
            let right = self.parse_cmp()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Filter, ParseError> {
        let field = self.parse_field()?;
        let op = self.parse_cmp_op()?;
        let value = self.parse_literal()?;
        Ok(Filter::Cmp { field, op, value })
    }

    fn parse_cmp_op(&mut self) -> Result<CmpOp, ParseError> {
        if self.eat_word("like") {
            return Ok(CmpOp::Like);
        }
        let op = match self.peek() {
            Some(SpannedToken {
                token: Token::Sym(sym),
                ..
            }) => match sym {
                Sym::Eq => Some(CmpOp::Eq),
                Sym::Ne => Some(CmpOp::Ne),
                Sym::Lt => Some(CmpOp::Lt),
                Sym::Le => Some(CmpOp::Le),
                Sym::Gt => Some(CmpOp::Gt),
                Sym::Ge => Some(CmpOp::Ge),
                Sym::Like => Some(CmpOp::Like),
                _ => None,
            },
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                Ok(op)
            }
            None => Err(self.error_here("expected a comparison operator")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let negative = self.eat_sym(Sym::Minus);
        match self.peek().cloned() {
            Some(SpannedToken {
                token: Token::Int(n),
                ..
            }) => {
                self.pos += 1;
                Ok(Literal::Int(if negative { -n } else { n }))
            }
            Some(SpannedToken {
                token: Token::Float(f),
                ..
            }) => {
                self.pos += 1;
                Ok(Literal::Float(if negative { -f } else { f }))
            }
            Some(SpannedToken {
                token: Token::Str(s),
                ..
            }) if !negative => {
                self.pos += 1;
                Ok(Literal::Str(s))
            }
            Some(SpannedToken {
                token: Token::Word(w),
                ..
            }) if !negative => {
                self.pos += 1;
                if w.eq_ignore_ascii_case("true") {
                    Ok(Literal::Bool(true))
                } else if w.eq_ignore_ascii_case("false") {
                    Ok(Literal::Bool(false))
                } else {
                    // Unquoted values are string literals.
                    Ok(Literal::Str(w))
                }
            }
            _ => Err(self.error_here("expected a value")),
        }
    }

    // ── SHOW ──

    fn parse_show_verbose(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let Some(relation) = self.peek_word().and_then(relation_keyword) else {
            return Err(self.error_here("expected DEPS, RDEPS, CALLERS, CALLEES or IMPACT"));
        };
        self.pos += 1;
        self.expect_word("of")?;
        let target = self.parse_node_ref()?;
        let depth = self.parse_depth()?;
        Ok(Statement::Show(Show {
            relation,
            target,
            depth,
        }))
    }

    fn parse_show_terse(&mut self, relation: Relation) -> Result<Statement, ParseError> {
        self.advance();
        let target = self.parse_node_ref()?;
        let depth = self.parse_depth()?;
        Ok(Statement::Show(Show {
            relation,
            target,
            depth,
        }))
    }

    fn parse_depth(&mut self) -> Result<Option<usize>, ParseError> {
        if self.eat_word("depth") {
            return Ok(Some(self.expect_int("DEPTH")?));
        }
        if let Some(depth) = self.peek_word().and_then(depth_shorthand) {
            self.pos += 1;
            return Ok(Some(depth));
        }
        Ok(None)
    }

    // ── FIND PATH ──

    fn parse_find_path(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        self.expect_word("path")?;
        self.expect_word("from")?;
        let from = self.parse_node_ref()?;
        self.expect_word("to")?;
        let to = self.parse_node_ref()?;
        let via = if self.eat_word("via") {
            Some(self.parse_edge_kind()?)
        } else {
            None
        };
        Ok(Statement::FindPath(FindPath { from, to, via }))
    }

    fn parse_edge_kind(&mut self) -> Result<EdgeKind, ParseError> {
        match self.peek_word().and_then(edge_kind_keyword) {
            Some(kind) => {
                self.pos += 1;
                Ok(kind)
            }
            None => Err(self.error_here("expected an edge type")),
        }
    }

    // ── ANALYZE ──

    fn parse_analyze(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let analysis = if self.eat_word("cycles") {
            let scope = if self.eat_word("in") {
                Some(self.parse_node_ref()?)
            } else {
                None
            };
            Analysis::Cycles { scope }
        } else if self.eat_word("complexity") {
            Analysis::Complexity
        } else if self.eat_word("coupling") {
            Analysis::Coupling
        } else {
            return Err(self.error_here("expected CYCLES, COMPLEXITY or COUPLING"));
        };
        Ok(Statement::Analyze(Analyze { analysis }))
    }

    // ── DESCRIBE ──

    fn parse_describe(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let target = self.parse_node_ref()?;
        Ok(Statement::Describe(Describe { target }))
    }

    /// A node reference: bare word or quoted string.
    fn parse_node_ref(&mut self) -> Result<String, ParseError> {
        match self.peek().cloned() {
            Some(SpannedToken {
                token: Token::Word(w),
                ..
            }) => {
                self.pos += 1;
                Ok(w)
            }
            Some(SpannedToken {
                token: Token::Str(s),
                ..
            }) => {
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error_here("expected a node reference")),
        }
    }
}

/// `d2` → depth 2. Anything that is not `d` + digits is not shorthand.
fn depth_shorthand(word: &str) -> Option<usize> {
    let rest = word.strip_prefix(['d', 'D'])?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_equivalent(terse: &str, verbose: &str) {
        let terse_ast = parse(terse).unwrap();
        let verbose_ast = parse(verbose).unwrap();
        assert_eq!(terse_ast, verbose_ast, "{terse} vs {verbose}");
    }

    #[test]
    fn test_terse_verbose_select_equivalence() {
        assert_equivalent(
            "SELECT n, c FROM fn WHERE c > 10",
            "SELECT name, complexity FROM function WHERE complexity > 10",
        );
        assert_equivalent(
            "SELECT n FROM fn sort -c 5",
            "SELECT name FROM function ORDER BY complexity DESC LIMIT 5",
        );
        assert_equivalent(
            "SELECT qn, fp FROM cls",
            "SELECT qualified_name, file_path FROM class",
        );
        assert_equivalent(
            "SELECT n FROM fn WHERE n ~ get_%",
            "SELECT name FROM function WHERE name LIKE 'get_%'",
        );
        assert_equivalent("select * from mod", "SELECT * FROM MODULE");
    }

    #[test]
    fn test_terse_verbose_show_equivalence() {
        assert_equivalent("deps foo d2", "SHOW DEPS OF foo DEPTH 2");
        assert_equivalent("rdeps foo", "SHOW RDEPS OF foo");
        assert_equivalent("callers bar", "SHOW CALLERS OF bar");
        assert_equivalent("callees 'pkg.run'", "SHOW CALLEES OF pkg.run");
        assert_equivalent("impact foo d3", "SHOW IMPACT OF foo DEPTH 3");
    }

    #[test]
    fn test_select_ast_shape() {
        let Statement::Select(select) = parse("SELECT name FROM fn WHERE c > 3 LIMIT 2").unwrap()
        else {
            panic!("expected select");
        };
        assert_eq!(select.projection, Projection::Fields(vec![Field::Name]));
        assert_eq!(select.kind, NodeKind::Function);
        assert_eq!(select.limit, Some(2));
        assert_eq!(
            select.filter,
            Some(Filter::Cmp {
                field: Field::Complexity,
                op: CmpOp::Gt,
                value: Literal::Int(3),
            })
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let Statement::Select(select) =
            parse("SELECT n FROM fn WHERE c > 1 AND c < 9 OR n = main").unwrap()
        else {
            panic!("expected select");
        };
        match select.filter.unwrap() {
            Filter::Or(left, right) => {
                assert!(matches!(*left, Filter::And(_, _)));
                assert!(matches!(
                    *right,
                    Filter::Cmp {
                        field: Field::Name,
                        ..
                    }
                ));
            }
            other => panic!("expected OR at the top, got {other:?}"),
        }
    }

    #[test]
    fn test_show_defaults_to_no_depth() {
        let Statement::Show(show) = parse("SHOW DEPS OF foo").unwrap() else {
            panic!("expected show");
        };
        assert_eq!(show.relation, Relation::Deps);
        assert_eq!(show.target, "foo");
        assert_eq!(show.depth, None);
    }

    #[test]
    fn test_find_path() {
        let Statement::FindPath(path) =
            parse("FIND PATH FROM foo TO bar VIA calls").unwrap()
        else {
            panic!("expected find path");
        };
        assert_eq!(path.from, "foo");
        assert_eq!(path.to, "bar");
        assert_eq!(path.via, Some(EdgeKind::Calls));

        let Statement::FindPath(no_via) = parse("FIND PATH FROM a TO b").unwrap() else {
            panic!("expected find path");
        };
        assert_eq!(no_via.via, None);
    }

    #[test]
    fn test_analyze_forms() {
        assert_eq!(
            parse("ANALYZE CYCLES").unwrap(),
            Statement::Analyze(Analyze {
                analysis: Analysis::Cycles { scope: None }
            })
        );
        assert_eq!(
            parse("ANALYZE CYCLES IN src/app").unwrap(),
            Statement::Analyze(Analyze {
                analysis: Analysis::Cycles {
                    scope: Some("src/app".to_string())
                }
            })
        );
        assert_eq!(
            parse("ANALYZE COMPLEXITY").unwrap(),
            Statement::Analyze(Analyze {
                analysis: Analysis::Complexity
            })
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            parse("DESCRIBE pkg.run").unwrap(),
            Statement::Describe(Describe {
                target: "pkg.run".to_string()
            })
        );
    }

    #[test]
    fn test_error_carries_token_and_position() {
        let error = parse("SELECT FROM fn").unwrap_err();
        assert_eq!(error.token, "FROM");
        assert_eq!(error.position, 7);

        let error = parse("SHOW nothing OF x").unwrap_err();
        assert_eq!(error.token, "nothing");

        let error = parse("SELECT n FROM fn garbage").unwrap_err();
        assert!(error.message.contains("trailing"));
        assert_eq!(error.token, "garbage");
    }

    #[test]
    fn test_unknown_leading_keyword() {
        let error = parse("frobnicate foo").unwrap_err();
        assert_eq!(error.position, 0);
    }

    #[test]
    fn test_empty_query() {
        let error = parse("   ").unwrap_err();
        assert!(error.message.contains("empty"));
    }

    #[test]
    fn test_depth_shorthand_bounds() {
        assert_eq!(depth_shorthand("d2"), Some(2));
        assert_eq!(depth_shorthand("D10"), Some(10));
        assert_eq!(depth_shorthand("d"), None);
        assert_eq!(depth_shorthand("deps"), None);
        assert_eq!(depth_shorthand("x2"), None);
    }
}
