//! Error types, diagnostics, and result aliases for CPE.
//!
//! Syntax errors never leave [`crate::parse`]: they are absorbed by the literal
//! fallback and only surface as [`Warning`]s. Evaluation returns a [`CpeError`]
//! only for trees that could not have come from the parser.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lexer::token::SourceLocation;

/// A code block that was kept as literal text because it did not parse
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    /// The block verbatim, delimiters included
    pub block: String,
    /// Byte offset of the block's opening `{{`
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    /// Why the block contents were rejected
    pub cause: CpeError,
}

/// Main error type for CPE
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CpeError {
    #[error("unexpected token")]
    #[diagnostic(code(E0001), help("{help}"))]
    UnexpectedToken {
        #[source_code]
        src: String,
        #[label("expected {expected}, found {found}")]
        span: SourceSpan,
        expected: String,
        found: String,
        help: String,
    },

    #[error("unexpected character")]
    #[diagnostic(code(E0002), help("{help}"))]
    UnexpectedCharacter {
        #[source_code]
        src: String,
        #[label("unexpected: '{ch}'")]
        span: SourceSpan,
        ch: char,
        help: String,
    },

    #[error("unterminated string")]
    #[diagnostic(code(E0003), help("add a closing '\"' before the end of the block"))]
    UnterminatedString {
        #[source_code]
        src: String,
        #[label("string started here but never closed")]
        span: SourceSpan,
    },

    #[error("invalid escape sequence")]
    #[diagnostic(code(E0004), help("{help}"))]
    InvalidEscapeSequence {
        #[source_code]
        src: String,
        #[label("invalid escape: {sequence}")]
        span: SourceSpan,
        sequence: String,
        help: String,
    },

    #[error("integer literal out of range")]
    #[diagnostic(code(E0005), help("integer literals must fit in a signed 64-bit integer"))]
    IntegerOverflow {
        #[source_code]
        src: String,
        #[label("{literal}")]
        span: SourceSpan,
        literal: String,
    },

    #[error("invalid rank")]
    #[diagnostic(code(E0006), help("ranks are 1-based: the first row is [1]"))]
    InvalidRank {
        #[source_code]
        src: String,
        #[label("rank must be at least 1")]
        span: SourceSpan,
    },

    #[error("expression too complex")]
    #[diagnostic(code(E0007), help("{help}"))]
    ExpressionTooComplex {
        #[source_code]
        src: String,
        #[label("limit reached here")]
        span: SourceSpan,
        help: String,
    },

    #[error("could not evaluate invalid AST: {ast}")]
    #[diagnostic(code(E0401), help("{reason}"))]
    InvalidAst { ast: String, reason: String },

    #[error("could not evaluate unrecognized AST: {ast}")]
    #[diagnostic(code(E0402))]
    UnrecognizedAst { ast: String },

    #[error("invalid environment: {message}")]
    #[diagnostic(code(E0501))]
    EnvironmentError { message: String },

    #[error("{count} code block(s) kept as literal text (--strict)")]
    #[diagnostic(code(E0601))]
    StrictCheckFailed { count: usize },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

impl CpeError {
    /// Create an UnexpectedToken error
    pub fn unexpected_token(
        src: impl Into<String>,
        location: &SourceLocation,
        expected: impl Into<String>,
        found: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        CpeError::UnexpectedToken {
            src: src.into(),
            span: (location.offset, location.length).into(),
            expected: expected.into(),
            found: found.into(),
            help: help.into(),
        }
    }

    /// Create an UnexpectedCharacter error
    pub fn unexpected_character(
        src: impl Into<String>,
        location: &SourceLocation,
        ch: char,
    ) -> Self {
        let help = match ch {
            '\'' | '`' => "use double quotes \"...\" for string literals".to_string(),
            '{' | '}' => "braces are only allowed as '{{' and '}}' around a code block".to_string(),
            '%' => "supported operators are + - * /".to_string(),
            _ => format!("'{}' is not valid inside a code block", ch),
        };
        CpeError::UnexpectedCharacter {
            src: src.into(),
            span: (location.offset, location.length).into(),
            ch,
            help,
        }
    }

    /// Create an UnterminatedString error
    pub fn unterminated_string(src: impl Into<String>, location: &SourceLocation) -> Self {
        CpeError::UnterminatedString {
            src: src.into(),
            span: (location.offset, location.length).into(),
        }
    }

    /// Create an InvalidEscapeSequence error
    pub fn invalid_escape_sequence(
        src: impl Into<String>,
        location: &SourceLocation,
        sequence: impl Into<String>,
    ) -> Self {
        let sequence = sequence.into();
        let help = format!(
            "'{}' is not a valid escape sequence; only \\\\ and \\\" are recognized",
            sequence
        );
        CpeError::InvalidEscapeSequence {
            src: src.into(),
            span: (location.offset, location.length).into(),
            sequence,
            help,
        }
    }

    /// Create an IntegerOverflow error
    pub fn integer_overflow(
        src: impl Into<String>,
        location: &SourceLocation,
        literal: impl Into<String>,
    ) -> Self {
        CpeError::IntegerOverflow {
            src: src.into(),
            span: (location.offset, location.length).into(),
            literal: literal.into(),
        }
    }

    /// Create an InvalidRank error
    pub fn invalid_rank(src: impl Into<String>, location: &SourceLocation) -> Self {
        CpeError::InvalidRank {
            src: src.into(),
            span: (location.offset, location.length).into(),
        }
    }

    /// Create an ExpressionTooComplex error
    pub fn expression_too_complex(
        src: impl Into<String>,
        location: &SourceLocation,
        help: impl Into<String>,
    ) -> Self {
        CpeError::ExpressionTooComplex {
            src: src.into(),
            span: (location.offset, location.length).into(),
            help: help.into(),
        }
    }

    /// Create an InvalidAst error for a hand-built node
    pub fn invalid_ast(ast: impl Into<String>, reason: impl Into<String>) -> Self {
        CpeError::InvalidAst {
            ast: ast.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnrecognizedAst error
    pub fn unrecognized_ast(ast: impl Into<String>) -> Self {
        CpeError::UnrecognizedAst { ast: ast.into() }
    }

    /// Create an EnvironmentError
    pub fn environment_error(message: impl Into<String>) -> Self {
        CpeError::EnvironmentError {
            message: message.into(),
        }
    }

    /// Create a StrictCheckFailed error
    pub fn strict_check_failed(count: usize) -> Self {
        CpeError::StrictCheckFailed { count }
    }

    /// Create an IoError
    pub fn io_error(message: impl Into<String>) -> Self {
        CpeError::IoError {
            message: message.into(),
        }
    }

    /// Whether this error comes from parsing a code block
    pub fn is_syntax_error(&self) -> bool {
        self.span().is_some()
    }

    /// Get the span (start, end) for this error, if it has one
    pub fn span(&self) -> Option<(usize, usize)> {
        let span = match self {
            CpeError::UnexpectedToken { span, .. }
            | CpeError::UnexpectedCharacter { span, .. }
            | CpeError::UnterminatedString { span, .. }
            | CpeError::InvalidEscapeSequence { span, .. }
            | CpeError::IntegerOverflow { span, .. }
            | CpeError::InvalidRank { span, .. }
            | CpeError::ExpressionTooComplex { span, .. } => span,
            CpeError::InvalidAst { .. }
            | CpeError::UnrecognizedAst { .. }
            | CpeError::EnvironmentError { .. }
            | CpeError::StrictCheckFailed { .. }
            | CpeError::IoError { .. } => return None,
        };
        Some((span.offset(), span.offset() + span.len()))
    }
}

/// Result type alias for CPE operations
pub type CpeResult<T> = Result<T, CpeError>;
