//! Parser for CPE code blocks
//!
//! This module implements a recursive descent parser that produces an
//! [`ast::Expr`] from the token stream of one code block:
//!
//! ```text
//! expr      := term (('+' | '-') term)*
//! term      := factor (('*' | '/') factor)*
//! factor    := integer | '-' factor | '(' expr ')' | string | reference
//! reference := identifier '[' integer ']' '.' identifier
//! ```
//!
//! The whole block must be consumed; leftover tokens are an error.

pub mod ast;

use std::ops::Range;

use crate::errors::{CpeError, CpeResult};
use crate::lexer::token::{SourceLocation, Token, TokenKind};
use crate::lexer::Lexer;
use ast::*;

/// Maximum parse recursion depth before the parser bails out.
/// Parentheses and unary minus both recurse, so deeply nested input
/// would otherwise overflow the stack.
const MAX_PARSE_DEPTH: usize = 128;

/// Maximum number of operator nodes in one expression. Operator chains are
/// built iteratively but walked recursively by evaluation, printing and drop.
const MAX_EXPR_NODES: usize = 256;

/// Lex and parse `source[range]` as a single expression
pub fn parse_expression(source: &str, range: Range<usize>) -> CpeResult<Expr> {
    let start = SourceLocation::at_offset(source, range.start, 0);
    parse_expression_at(source, range, start)
}

/// Like [`parse_expression`], with the location of `range.start` already known
pub fn parse_expression_at(
    source: &str,
    range: Range<usize>,
    start: SourceLocation,
) -> CpeResult<Expr> {
    let mut lexer = Lexer::for_block_at(source, range, start);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens, source);
    parser.parse()
}

/// Parser for one code block
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    /// Whole template, copied into diagnostics only on error
    source: &'a str,
    /// Current recursion depth
    depth: usize,
    /// Operator nodes built so far
    nodes: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser from a token stream
    pub fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            depth: 0,
            nodes: 0,
        }
    }

    /// Parse the block as one expression, requiring every token to be used
    pub fn parse(&mut self) -> CpeResult<Expr> {
        let expr = self.parse_expr()?;

        if !self.is_at_end() {
            return Err(self.error_unexpected("an operator or the end of the block"));
        }

        Ok(expr)
    }

    fn parse_expr(&mut self) -> CpeResult<Expr> {
        self.parse_additive()
    }

    /// Parse additive expression: `a + b`, `a - b`
    fn parse_additive(&mut self) -> CpeResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        while matches!(self.current().kind, TokenKind::Plus | TokenKind::Minus) {
            let op = match &self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => unreachable!(),
            };
            let op_loc = self.current_location();
            self.advance();
            let right = self.parse_multiplicative()?;

            self.count_node(&op_loc)?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse multiplicative expression: `a * b`, `a / b`
    fn parse_multiplicative(&mut self) -> CpeResult<Expr> {
        let mut left = self.parse_unary()?;

        while matches!(self.current().kind, TokenKind::Star | TokenKind::Slash) {
            let op = match &self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => unreachable!(),
            };
            let op_loc = self.current_location();
            self.advance();
            let right = self.parse_unary()?;

            self.count_node(&op_loc)?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse unary minus. A negated integer literal becomes a negative literal;
    /// anything else is rewritten as `0 - operand`.
    fn parse_unary(&mut self) -> CpeResult<Expr> {
        if !self.check(&TokenKind::Minus) {
            return self.parse_primary();
        }

        let start_loc = self.current_location();
        self.advance();

        // The sign applies before the range check, so i64::MIN is writable
        if let TokenKind::Integer(n) = self.current().kind {
            let end_loc = self.current_location();
            self.advance();
            return 0i64
                .checked_sub_unsigned(n)
                .map(Expr::Number)
                .ok_or_else(|| {
                    CpeError::integer_overflow(
                        self.source,
                        &start_loc.span_to(&end_loc),
                        format!("-{}", n),
                    )
                });
        }

        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;

        match operand? {
            Expr::Number(n) => n.checked_neg().map(Expr::Number).ok_or_else(|| {
                let end_loc = self.previous_location();
                CpeError::integer_overflow(
                    self.source,
                    &start_loc.span_to(&end_loc),
                    format!("-({})", n),
                )
            }),
            other => {
                self.count_node(&start_loc)?;
                Ok(Expr::binary(BinaryOp::Sub, Expr::Number(0), other))
            }
        }
    }

    /// Parse primary expression
    fn parse_primary(&mut self) -> CpeResult<Expr> {
        match &self.current().kind.clone() {
            TokenKind::Integer(n) => {
                let n = i64::try_from(*n).map_err(|_| {
                    CpeError::integer_overflow(self.source, &self.current_location(), n.to_string())
                })?;
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(Expr::String(s))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                self.parse_reference(name)
            }
            TokenKind::LeftParen => {
                self.advance();
                self.enter()?;
                let expr = self.parse_expr();
                self.depth -= 1;
                let expr = expr?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.error_unexpected("a number, string, reference or '('")),
        }
    }

    /// Parse the `[rank].field` tail of a reference
    fn parse_reference(&mut self, name: String) -> CpeResult<Expr> {
        self.expect(&TokenKind::LeftBracket)?;

        let rank_loc = self.current_location();
        let rank = match self.current().kind {
            TokenKind::Integer(0) => return Err(CpeError::invalid_rank(self.source, &rank_loc)),
            TokenKind::Integer(n) => i64::try_from(n)
                .map_err(|_| CpeError::integer_overflow(self.source, &rank_loc, n.to_string()))?,
            _ => return Err(self.error_unexpected("a rank")),
        };
        self.advance();

        self.expect(&TokenKind::RightBracket)?;
        self.expect(&TokenKind::Dot)?;
        let field = self.expect_ident("a field name")?;

        Ok(Expr::reference(name, rank, field))
    }

    // Helper methods

    /// Track one more level of nesting
    fn enter(&mut self) -> CpeResult<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            self.depth -= 1;
            return Err(CpeError::expression_too_complex(
                self.source,
                &self.current_location(),
                format!("expressions may nest at most {} levels", MAX_PARSE_DEPTH),
            ));
        }
        Ok(())
    }

    /// Charge one operator node against the expression budget
    fn count_node(&mut self, location: &SourceLocation) -> CpeResult<()> {
        self.nodes += 1;
        if self.nodes > MAX_EXPR_NODES {
            return Err(CpeError::expression_too_complex(
                self.source,
                location,
                format!("expressions may contain at most {} operators", MAX_EXPR_NODES),
            ));
        }
        Ok(())
    }

    /// Get the current token
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream should not be empty")
        })
    }

    /// Get the current token's location
    fn current_location(&self) -> SourceLocation {
        self.current().location
    }

    /// Get the previous token's location
    fn previous_location(&self) -> SourceLocation {
        if self.pos > 0 {
            self.tokens[self.pos - 1].location
        } else {
            self.current_location()
        }
    }

    /// Check if we're at the end of input
    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    /// Check if current token matches expected kind
    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    /// Advance to next token
    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    /// Expect a specific token kind
    fn expect(&mut self, kind: &TokenKind) -> CpeResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_unexpected(&format!("'{}'", kind)))
        }
    }

    /// Expect an identifier and return its name
    fn expect_ident(&mut self, context: &str) -> CpeResult<String> {
        if let TokenKind::Ident(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_unexpected(context))
        }
    }

    /// Create an "unexpected token" error
    fn error_unexpected(&self, expected: &str) -> CpeError {
        let help = match &self.current().kind {
            TokenKind::Ident(_) if !self.is_at_end() && self.pos > 0 => {
                "references look like name[rank].field"
            }
            TokenKind::Eof => "the expression is incomplete",
            _ => "check syntax",
        };
        CpeError::unexpected_token(
            self.source,
            &self.current_location(),
            expected,
            format!("{}", self.current().kind),
            help,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> CpeResult<Expr> {
        parse_expression(source, 0..source.len())
    }

    fn num(n: i64) -> Expr {
        Expr::Number(n)
    }

    #[test]
    fn test_integer() {
        assert_eq!(parse("42").unwrap(), num(42));
        assert_eq!(parse("  0 ").unwrap(), num(0));
    }

    #[test]
    fn test_negative_integer_is_literal() {
        assert_eq!(parse("-3").unwrap(), num(-3));
        assert_eq!(parse("- 3").unwrap(), num(-3));
        assert_eq!(parse("--3").unwrap(), num(3));
    }

    #[test]
    fn test_negated_expression() {
        assert_eq!(
            parse("-(1 + 2)").unwrap(),
            Expr::binary(
                BinaryOp::Sub,
                num(0),
                Expr::binary(BinaryOp::Add, num(1), num(2))
            )
        );
    }

    #[test]
    fn test_string() {
        assert_eq!(
            parse(r#" "\\Say \"hi\"" "#).unwrap(),
            Expr::String("\\Say \"hi\"".to_string())
        );
    }

    #[test]
    fn test_reference() {
        assert_eq!(
            parse("products[1].name").unwrap(),
            Expr::reference("products", 1, "name")
        );
        assert_eq!(
            parse("products [ 12 ] . name").unwrap(),
            Expr::reference("products", 12, "name")
        );
    }

    #[test]
    fn test_reference_rank_zero_rejected() {
        let err = parse("products[0].name").unwrap_err();
        assert!(matches!(err, CpeError::InvalidRank { .. }));
    }

    #[test]
    fn test_incomplete_references() {
        assert!(parse("products").is_err());
        assert!(parse("products[1]").is_err());
        assert!(parse("products[1].").is_err());
        assert!(parse("products[-1].name").is_err());
        assert!(parse("products[x].name").is_err());
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + products[2].quantity / 2").unwrap(),
            Expr::binary(
                BinaryOp::Add,
                num(1),
                Expr::binary(
                    BinaryOp::Div,
                    Expr::reference("products", 2, "quantity"),
                    num(2)
                )
            )
        );
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(
            parse("(3 + 2) * 1").unwrap(),
            Expr::binary(
                BinaryOp::Mul,
                Expr::binary(BinaryOp::Add, num(3), num(2)),
                num(1)
            )
        );
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            parse("1 - 2 - 3").unwrap(),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, num(1), num(2)),
                num(3)
            )
        );
        assert_eq!(
            parse("8 / 4 * 2").unwrap(),
            Expr::binary(
                BinaryOp::Mul,
                Expr::binary(BinaryOp::Div, num(8), num(4)),
                num(2)
            )
        );
    }

    #[test]
    fn test_leftover_tokens_fail() {
        let err = parse("that is not valid code").unwrap_err();
        assert!(matches!(err, CpeError::UnexpectedToken { .. }));
        assert!(parse("1 2").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_error_span_points_into_template() {
        let template = "A {{1 + }} B";
        let start = template.find("{{").unwrap() + 2;
        let end = template.find("}}").unwrap();
        let err = parse_expression(template, start..end).unwrap_err();
        let (span_start, _) = err.span().unwrap();
        assert_eq!(span_start, end);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse(&deep).is_err());

        let ok = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse(&ok).unwrap(), num(1));
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let long = format!("{}1", "1+".repeat(20_000));
        let err = parse(&long).unwrap_err();
        assert!(matches!(err, CpeError::ExpressionTooComplex { .. }), "{:?}", err);

        let products = format!("{}2", "2 * ".repeat(10_000));
        assert!(matches!(
            parse(&products).unwrap_err(),
            CpeError::ExpressionTooComplex { .. }
        ));

        let negations = format!("{}x[1].y", "-".repeat(MAX_EXPR_NODES + 1));
        assert!(parse(&negations).is_err());
    }

    #[test]
    fn test_operator_chain_within_budget() {
        let chain = format!("{}1", "1 + ".repeat(MAX_EXPR_NODES));
        let expr = parse(&chain).unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_i64_bounds() {
        assert_eq!(parse("-9223372036854775808").unwrap(), num(i64::MIN));
        assert_eq!(parse("9223372036854775807").unwrap(), num(i64::MAX));
        assert!(matches!(
            parse("9223372036854775808").unwrap_err(),
            CpeError::IntegerOverflow { .. }
        ));
        assert!(matches!(
            parse("-9223372036854775809").unwrap_err(),
            CpeError::IntegerOverflow { .. }
        ));
        assert!(matches!(
            parse("x[9223372036854775808].y").unwrap_err(),
            CpeError::IntegerOverflow { .. }
        ));
    }

    #[test]
    fn test_known_start_location() {
        let template = "one\ntwo {{1 +}}";
        let start = template.find("{{").unwrap() + 2;
        let end = template.find("}}").unwrap();
        let known = SourceLocation::new(2, 7, start, 0);
        let err = parse_expression_at(template, start..end, known).unwrap_err();
        assert_eq!(err.span(), parse_expression(template, start..end).unwrap_err().span());
    }

    #[test]
    fn test_display_reparses() {
        let source = "(1 - x[2].y) * -4 / (\"a\\\"b\" + z[1].w)";
        let expr = parse(source).unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }
}
