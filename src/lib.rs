// Rust 1.93+ triggers false positives on thiserror/miette derive macro fields
#![allow(unused_assignments)]

//! Creative Property Expression (CPE)
//!
//! A small template language for filling text and numeric properties from
//! ranked query results. Literal text passes through; `{{ ... }}` blocks hold
//! arithmetic over integer and string literals and references of the form
//! `name[rank].field`. A block that does not parse is kept as literal text.
//!
//! # Example
//!
//! ```
//! use cpe::{render, QueryTable};
//! use serde_json::json;
//!
//! let env = QueryTable::from_json(json!({
//!     "products": [{"name": "Widget", "quantity": 4}]
//! }))
//! .unwrap();
//!
//! let out = render("{{products[1].name}} x{{products[1].quantity * 2}}", &env).unwrap();
//! assert_eq!(out.to_string(), "Widget x8");
//! ```

pub mod environment;
pub mod errors;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod template;

pub use environment::{
    load_environment, resolve_query, EmptyEnvironment, EnvFormat, Environment, LookupError,
    QueryFn, QueryTable, Row,
};
pub use errors::{CpeError, CpeResult, Warning};
pub use evaluator::{Evaluator, Rendered, Value};
pub use lexer::token::{SourceLocation, Token, TokenKind};
pub use lexer::Lexer;
pub use parser::ast::{self, BinaryOp, Expr, Reference, Segment, Template};
pub use parser::Parser;
pub use template::{parse, parse_with_warnings};

/// Evaluate a parse result against an environment
pub fn evaluate(template: &Template, env: &dyn Environment) -> CpeResult<Rendered> {
    Evaluator::new(env).evaluate(template)
}

/// Evaluate a single expression tree against an environment
pub fn evaluate_expr(expr: &Expr, env: &dyn Environment) -> CpeResult<Rendered> {
    Evaluator::new(env).eval_expr(expr)
}

/// Parse and evaluate template source in one step
pub fn render(source: &str, env: &dyn Environment) -> CpeResult<Rendered> {
    evaluate(&parse(source), env)
}

/// Evaluate a hand-built tree given in the JSON interchange form
pub fn evaluate_json(json: &serde_json::Value, env: &dyn Environment) -> CpeResult<Rendered> {
    let template = Template::from_json(json)?;
    evaluate(&template, env)
}
