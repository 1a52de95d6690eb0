use std::fmt;

/// Source location information for error reporting.
///
/// Offsets are byte offsets into the whole template, not into the code block,
/// so diagnostics can point at the block in context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of template
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }

    /// Locate `offset` within `source`, computing its line and column
    pub fn at_offset(source: &str, offset: usize, length: usize) -> Self {
        let start = SourceLocation::new(1, 1, 0, 0);
        SourceLocation {
            length,
            ..start.advance_to(source, offset)
        }
    }

    /// Move forward to `offset`, scanning only the text in between.
    /// `offset` must not be before this location.
    pub fn advance_to(&self, source: &str, offset: usize) -> SourceLocation {
        let skipped = &source[self.offset..offset];
        let (line, column) = match skipped.rfind('\n') {
            Some(nl) => (
                self.line + skipped.matches('\n').count(),
                skipped[nl + 1..].chars().count() + 1,
            ),
            None => (self.line, self.column + skipped.chars().count()),
        };
        SourceLocation::new(line, column, offset, 0)
    }

    /// Create a span from this location to another
    pub fn span_to(&self, other: &SourceLocation) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            offset: self.offset,
            length: (other.offset + other.length).saturating_sub(self.offset),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<template>:{}:{}", self.line, self.column)
    }
}

/// Token type enumeration - all possible tokens inside a code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    /// Unsigned digits; the parser applies any sign and range check
    Integer(u64),
    String(String),

    // Identifiers
    Ident(String),

    // Punctuation
    LeftBracket,  // [
    RightBracket, // ]
    LeftParen,    // (
    RightParen,   // )
    Dot,          // .

    // Operators
    Plus,  // +
    Minus, // -
    Star,  // *
    Slash, // /

    // Special
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Eof => write!(f, "<end of block>"),
        }
    }
}

/// A token with its location and kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}
