//! Abstract Syntax Tree (AST) definitions for CPE
//!
//! A parsed template is a [`Template`]: plain text, a single expression, or an
//! ordered mix of both. Expressions are owned trees with no back-references,
//! built once by the parser and only ever read by the evaluator.
//!
//! Trees have a JSON form shared with hosts that build them by hand: numbers and
//! strings are bare, references are `{"type":"ref","name":..,"rank":..,"field":..}`
//! and operations are `{"type":"+","left":..,"right":..}`.

use std::fmt;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::errors::{CpeError, CpeResult};
use crate::lexer::is_identifier;

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// The operator's tag, as written in source and in the JSON form
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "*" => Some(BinaryOp::Mul),
            "/" => Some(BinaryOp::Div),
            _ => None,
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Reference into a data source: `name[rank].field`
///
/// The parser only produces shape-valid references. Hand-built ones are checked
/// by [`Reference::validate`] when evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Data-source name
    pub name: String,
    /// 1-based row index
    pub rank: i64,
    /// Column name
    pub field: String,
}

impl Reference {
    pub fn new(name: impl Into<String>, rank: i64, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank,
            field: field.into(),
        }
    }

    /// Check the shape invariants, returning the first violation
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.name) {
            return Err(format!("reference name {:?} is not an identifier", self.name));
        }
        if self.rank < 1 {
            return Err(format!("reference rank {} is not a positive integer", self.rank));
        }
        if !is_identifier(&self.field) {
            return Err(format!("reference field {:?} is not an identifier", self.field));
        }
        Ok(())
    }
}

/// Binary arithmetic: `left op right`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal (unary minus is folded in at parse time)
    Number(i64),
    /// String literal, already unescaped
    String(String),
    /// `name[rank].field`
    Ref(Reference),
    /// `left op right`
    Binary(BinaryExpr),
}

impl Expr {
    /// Build a reference node
    pub fn reference(name: impl Into<String>, rank: i64, field: impl Into<String>) -> Self {
        Expr::Ref(Reference::new(name, rank, field))
    }

    /// Build a binary operation node
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Convert to the JSON interchange form
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Expr::Number(n) => serde_json::Value::from(*n),
            Expr::String(s) => serde_json::Value::String(s.clone()),
            Expr::Ref(r) => serde_json::json!({
                "type": "ref",
                "name": r.name,
                "rank": r.rank,
                "field": r.field,
            }),
            Expr::Binary(bin) => serde_json::json!({
                "type": bin.op.symbol(),
                "left": bin.left.to_json(),
                "right": bin.right.to_json(),
            }),
        }
    }

    /// Read a hand-built tree from the JSON interchange form.
    ///
    /// References whose attributes have the right JSON types load even when
    /// their values break the shape invariants; those fail at evaluation.
    pub fn from_json(json: &serde_json::Value) -> CpeResult<Expr> {
        use serde_json::Value as Json;

        match json {
            Json::Number(n) => n
                .as_i64()
                .map(Expr::Number)
                .ok_or_else(|| CpeError::unrecognized_ast(json.to_string())),
            Json::String(s) => Ok(Expr::String(s.clone())),
            Json::Object(obj) => {
                let tag = obj.get("type").and_then(Json::as_str).unwrap_or_default();
                if tag == "ref" {
                    return reference_from_json(json);
                }
                let op = BinaryOp::from_symbol(tag)
                    .ok_or_else(|| CpeError::unrecognized_ast(json.to_string()))?;
                let operand = |key: &str| match obj.get(key) {
                    Some(child) => Expr::from_json(child),
                    None => Err(CpeError::unrecognized_ast("undefined")),
                };
                let left = operand("left")?;
                let right = operand("right")?;
                Ok(Expr::binary(op, left, right))
            }
            Json::Null | Json::Bool(_) | Json::Array(_) => {
                Err(CpeError::unrecognized_ast(json.to_string()))
            }
        }
    }
}

fn reference_from_json(json: &serde_json::Value) -> CpeResult<Expr> {
    let invalid = |reason: &str| CpeError::invalid_ast(json.to_string(), reason);

    let name = json
        .get("name")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| invalid("reference name must be a string"))?;
    let rank = json
        .get("rank")
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| invalid("reference rank must be an integer"))?;
    let field = json
        .get("field")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| invalid("reference field must be a string"))?;

    Ok(Expr::reference(name, rank, field))
}

/// Writes the expression back as CPE source, adding parentheses only where
/// precedence or associativity requires them.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::String(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    match ch {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Expr::Ref(r) => write!(f, "{}[{}].{}", r.name, r.rank, r.field),
            Expr::Binary(bin) => {
                let prec = bin.op.precedence();
                match bin.left.as_ref() {
                    Expr::Binary(l) if l.op.precedence() < prec => write!(f, "({})", bin.left)?,
                    left => write!(f, "{}", left)?,
                }
                write!(f, " {} ", bin.op)?;
                match bin.right.as_ref() {
                    Expr::Binary(r) if r.op.precedence() <= prec => write!(f, "({})", bin.right),
                    right => write!(f, "{}", right),
                }
            }
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expr::Number(n) => serializer.serialize_i64(*n),
            Expr::String(s) => serializer.serialize_str(s),
            Expr::Ref(r) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("type", "ref")?;
                map.serialize_entry("name", &r.name)?;
                map.serialize_entry("rank", &r.rank)?;
                map.serialize_entry("field", &r.field)?;
                map.end()
            }
            Expr::Binary(bin) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", bin.op.symbol())?;
                map.serialize_entry("left", bin.left.as_ref())?;
                map.serialize_entry("right", bin.right.as_ref())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Expr::from_json(&json).map_err(serde::de::Error::custom)
    }
}

/// One element of a composite template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, including code blocks that fell back to text
    Text(String),
    /// A parsed code block
    Code(Expr),
}

/// The result of parsing a whole template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// No code at all (or only code that fell back to text)
    Literal(String),
    /// Exactly one code block and nothing around it
    Single(Expr),
    /// Text and code interleaved, in source order, with no empty text at the edges
    Composite(Vec<Segment>),
}

impl Template {
    /// Convert to the JSON interchange form
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Template::Literal(s) => serde_json::Value::String(s.clone()),
            Template::Single(expr) => expr.to_json(),
            Template::Composite(segments) => serde_json::Value::Array(
                segments
                    .iter()
                    .map(|seg| match seg {
                        Segment::Text(s) => serde_json::Value::String(s.clone()),
                        Segment::Code(expr) => expr.to_json(),
                    })
                    .collect(),
            ),
        }
    }

    /// Read a hand-built parse result. A top-level array is a composite whose
    /// string elements are taken as text; anything else is a single value.
    pub fn from_json(json: &serde_json::Value) -> CpeResult<Template> {
        match json {
            serde_json::Value::String(s) => Ok(Template::Literal(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(Segment::Text(s.clone())),
                    other => Expr::from_json(other).map(Segment::Code),
                })
                .collect::<CpeResult<Vec<_>>>()
                .map(Template::Composite),
            other => Expr::from_json(other).map(Template::Single),
        }
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Template::Literal(s) => serializer.serialize_str(s),
            Template::Single(expr) => expr.serialize(serializer),
            Template::Composite(segments) => {
                let mut seq = serializer.serialize_seq(Some(segments.len()))?;
                for seg in segments {
                    match seg {
                        Segment::Text(s) => seq.serialize_element(s)?,
                        Segment::Code(expr) => seq.serialize_element(expr)?,
                    }
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Template::from_json(&json).map_err(serde::de::Error::custom)
    }
}
