//! Lexer (tokenizer) for CPE code blocks.
//!
//! Converts the inner text of one `{{ ... }}` block into a stream of
//! [`token::Token`]s for the parser. Locations are reported relative to the
//! whole template so diagnostics can show the block in context.

pub mod token;

use std::ops::Range;

use crate::errors::{CpeError, CpeResult};
use token::{SourceLocation, Token, TokenKind};

/// Whether `s` lexes as exactly one identifier token
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Lexer for the contents of a single code block
pub struct Lexer<'a> {
    /// Whole template (for error reporting)
    source: &'a str,
    /// Characters of the block being lexed
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    /// Byte offset of the block within `source`
    base: usize,
    /// End of the block within `source`
    end: usize,
    /// Current position in bytes (absolute)
    position: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start position of current token
    token_start: usize,
    /// Start line of current token
    token_start_line: usize,
    /// Start column of current token
    token_start_column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over the whole of `source`
    pub fn new(source: &'a str) -> Self {
        Self::for_block(source, 0..source.len())
    }

    /// Create a lexer over `source[range]`, reporting absolute locations
    pub fn for_block(source: &'a str, range: Range<usize>) -> Self {
        let start = SourceLocation::at_offset(source, range.start, 0);
        Self::for_block_at(source, range, start)
    }

    /// Like [`Lexer::for_block`], with the line and column of `range.start`
    /// already known
    pub fn for_block_at(source: &'a str, range: Range<usize>, start: SourceLocation) -> Self {
        let SourceLocation { line, column, .. } = start;

        Self {
            source,
            chars: source[range.clone()].char_indices().peekable(),
            base: range.start,
            end: range.end,
            position: range.start,
            line,
            column,
            token_start: range.start,
            token_start_line: line,
            token_start_column: column,
        }
    }

    /// Tokenize the entire block and return all tokens
    pub fn tokenize(&mut self) -> CpeResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> CpeResult<Token> {
        self.skip_whitespace();

        self.token_start = self.position;
        self.token_start_line = self.line;
        self.token_start_column = self.column;

        let Some(ch) = self.peek_char() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        let kind = match ch {
            'a'..='z' | 'A'..='Z' | '_' => return self.lex_identifier(),
            '0'..='9' => return self.lex_number(),
            '"' => return self.lex_string(),
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            _ => return Err(self.error_unexpected_char(ch)),
        };

        self.advance();
        Ok(self.make_token(kind))
    }

    /// Peek at the current character without consuming
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let (pos, ch) = self.chars.next()?;
        self.position = self.base + pos + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_char(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
    }

    /// Lex an identifier: `[A-Za-z_][A-Za-z0-9_]*`
    fn lex_identifier(&mut self) -> CpeResult<Token> {
        let start = self.position;

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.position];
        Ok(self.make_token(TokenKind::Ident(text.to_string())))
    }

    /// Lex a base-10 integer (no sign, no fraction, no exponent).
    /// Values up to `u64::MAX` lex so that `-9223372036854775808` can be folded.
    fn lex_number(&mut self) -> CpeResult<Token> {
        let start = self.position;

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.position];
        let value: u64 = text
            .parse()
            .map_err(|_| CpeError::integer_overflow(self.source, &self.token_location(), text))?;

        Ok(self.make_token(TokenKind::Integer(value)))
    }

    /// Lex a double-quoted string. Only `\\` and `\"` are escapes.
    fn lex_string(&mut self) -> CpeResult<Token> {
        self.advance(); // opening "

        let mut value = String::new();

        loop {
            match self.peek_char() {
                None => {
                    return Err(CpeError::unterminated_string(
                        self.source,
                        &self.token_location(),
                    ));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    let escape_start = self.current_location();
                    self.advance();
                    match self.peek_char() {
                        Some(ch @ ('\\' | '"')) => {
                            self.advance();
                            value.push(ch);
                        }
                        Some(ch) => {
                            self.advance();
                            let loc = escape_start.span_to(&self.current_location_empty());
                            return Err(CpeError::invalid_escape_sequence(
                                self.source,
                                &loc,
                                format!("\\{}", ch),
                            ));
                        }
                        None => {
                            return Err(CpeError::unterminated_string(
                                self.source,
                                &self.token_location(),
                            ));
                        }
                    }
                }
                Some(ch) => {
                    self.advance();
                    value.push(ch);
                }
            }
        }

        Ok(self.make_token(TokenKind::String(value)))
    }

    /// Create a token with the current token span
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.token_location())
    }

    /// Get the location for the current token
    fn token_location(&self) -> SourceLocation {
        SourceLocation::new(
            self.token_start_line,
            self.token_start_column,
            self.token_start,
            self.position - self.token_start,
        )
    }

    /// Get the current location (one character wide, or empty at the end)
    fn current_location(&self) -> SourceLocation {
        let length = if self.position < self.end { 1 } else { 0 };
        SourceLocation::new(self.line, self.column, self.position, length)
    }

    fn current_location_empty(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.position, 0)
    }

    /// Create an unexpected character error
    fn error_unexpected_char(&self, ch: char) -> CpeError {
        let loc = SourceLocation::new(self.line, self.column, self.position, ch.len_utf8());
        CpeError::unexpected_character(self.source, &loc, ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("products"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier("my-field"));
        assert!(!is_identifier("a b"));
    }

    #[test]
    fn test_empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(lex("  \t\n "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_reference() {
        assert_eq!(
            lex("products[2].quantity"),
            vec![
                TokenKind::Ident("products".to_string()),
                TokenKind::LeftBracket,
                TokenKind::Integer(2),
                TokenKind::RightBracket,
                TokenKind::Dot,
                TokenKind::Ident("quantity".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex("0"), vec![TokenKind::Integer(0), TokenKind::Eof]);
        assert_eq!(lex("007"), vec![TokenKind::Integer(7), TokenKind::Eof]);
        // Sign is a separate token; the parser folds it into the literal
        assert_eq!(
            lex("-3"),
            vec![TokenKind::Minus, TokenKind::Integer(3), TokenKind::Eof]
        );
        // No fractions: the dot is its own token
        assert_eq!(
            lex("1.5"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Dot,
                TokenKind::Integer(5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_integer_overflow() {
        let mut lexer = Lexer::new("99999999999999999999");
        let err = lexer.tokenize().unwrap_err();
        assert!(matches!(err, CpeError::IntegerOverflow { .. }));
    }

    #[test]
    fn test_integer_beyond_i64_still_lexes() {
        assert_eq!(
            lex("9223372036854775808"),
            vec![TokenKind::Integer(9_223_372_036_854_775_808), TokenKind::Eof]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("( + - * / )"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            lex(r#""\\Say \"hi\"""#),
            vec![
                TokenKind::String("\\Say \"hi\"".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_keeps_braces() {
        assert_eq!(
            lex(r#""}}{""#),
            vec![TokenKind::String("}}{".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unknown_escape_is_error() {
        let mut lexer = Lexer::new(r#""a\nb""#);
        match lexer.tokenize().unwrap_err() {
            CpeError::InvalidEscapeSequence { sequence, span, .. } => {
                assert_eq!(sequence, "\\n");
                assert_eq!(span.offset(), 2);
                assert_eq!(span.len(), 2);
            }
            other => panic!("expected InvalidEscapeSequence, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_string_error() {
        let mut lexer = Lexer::new("\"abc");
        let err = lexer.tokenize().unwrap_err();
        assert!(matches!(err, CpeError::UnterminatedString { .. }));
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("a % b");
        match lexer.tokenize().unwrap_err() {
            CpeError::UnexpectedCharacter { ch, span, .. } => {
                assert_eq!(ch, '%');
                assert_eq!(span.offset(), 2);
            }
            other => panic!("expected UnexpectedCharacter, got {:?}", other),
        }
    }

    #[test]
    fn test_block_locations_are_absolute() {
        let template = "line one\nA {{ x[1].y }}";
        let start = template.find("{{").unwrap() + 2;
        let end = template.find("}}").unwrap();
        let mut lexer = Lexer::for_block(template, start..end);
        let tokens = lexer.tokenize().unwrap();

        let ident = &tokens[0];
        assert_eq!(ident.kind, TokenKind::Ident("x".to_string()));
        assert_eq!(ident.location.offset, start + 1);
        assert_eq!(ident.location.line, 2);
        assert_eq!(ident.location.column, 6);

        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.location.offset, end);
    }

    #[test]
    fn test_block_with_known_start() {
        let template = "line one\nA {{ x[1].y }}";
        let start = template.find("{{").unwrap() + 2;
        let end = template.find("}}").unwrap();
        let known = SourceLocation::new(2, 5, start, 0);

        let tokens = Lexer::for_block_at(template, start..end, known)
            .tokenize()
            .unwrap();
        let scanned = Lexer::for_block(template, start..end).tokenize().unwrap();
        assert_eq!(tokens, scanned);
    }
}
