//! Template composition: scanning, per-block parsing, and the literal fallback.
//!
//! Parsing a template never fails. A code block whose contents do not parse is
//! kept verbatim, braces included, as part of the surrounding literal text.

pub mod scanner;

use std::ops::Range;

use crate::errors::{CpeError, Warning};
use crate::lexer::token::SourceLocation;
use crate::parser::ast::{Expr, Segment, Template};
use crate::parser::parse_expression_at;
use scanner::{Piece, Scanner};

/// Parse a template
pub fn parse(source: &str) -> Template {
    parse_with_warnings(source).0
}

/// Parse a template, also reporting every code block that fell back to text
pub fn parse_with_warnings(source: &str) -> (Template, Vec<Warning>) {
    let mut composer = Composer::new(source);
    for piece in Scanner::new(source) {
        composer.push(piece);
    }
    composer.finish()
}

/// Accumulates scanned pieces into a [`Template`]
struct Composer<'a> {
    source: &'a str,
    segments: Vec<Segment>,
    /// Literal text not yet pushed; consecutive text runs merge here
    text: String,
    warnings: Vec<Warning>,
    /// Line and column of the last block seen; blocks arrive in source order
    cursor: SourceLocation,
}

impl<'a> Composer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            segments: Vec::new(),
            text: String::new(),
            warnings: Vec::new(),
            cursor: SourceLocation::new(1, 1, 0, 0),
        }
    }

    fn push(&mut self, piece: Piece) {
        let source = self.source;
        match piece {
            Piece::Text(range) => self.text.push_str(&source[range]),
            Piece::Block { outer, inner } => {
                let loc = self.cursor.advance_to(source, outer.start);
                self.cursor = loc.advance_to(source, inner.start);

                match parse_expression_at(source, inner, self.cursor) {
                    Ok(expr) => self.push_code(expr),
                    Err(cause) => self.push_fallback(outer, loc, cause),
                }
            }
        }
    }

    /// Keep a block that failed to parse as text, recording why
    fn push_fallback(&mut self, outer: Range<usize>, loc: SourceLocation, cause: CpeError) {
        let source = self.source;
        let block = &source[outer];
        log::debug!("keeping {:?} as literal text: {}", block, cause);

        self.warnings.push(Warning {
            message: format!("code block kept as literal text: {}", cause),
            block: block.to_string(),
            offset: loc.offset,
            line: loc.line,
            column: loc.column,
            cause,
        });
        self.text.push_str(block);
    }

    fn push_code(&mut self, expr: Expr) {
        if !self.text.is_empty() {
            self.segments.push(Segment::Text(std::mem::take(&mut self.text)));
        }
        self.segments.push(Segment::Code(expr));
    }

    fn finish(mut self) -> (Template, Vec<Warning>) {
        if !self.text.is_empty() {
            self.segments.push(Segment::Text(std::mem::take(&mut self.text)));
        }

        let template = if self.segments.len() > 1 {
            Template::Composite(self.segments)
        } else {
            match self.segments.pop() {
                None => Template::Literal(String::new()),
                Some(Segment::Text(text)) => Template::Literal(text),
                Some(Segment::Code(expr)) => Template::Single(expr),
            }
        };

        (template, self.warnings)
    }
}
