//! Runtime values for the CPE evaluator
//!
//! [`Value`] is host data as it sits in an environment row. [`Rendered`] is
//! what evaluation produces: a number or a string, nothing else.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

/// A field value supplied by the host
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (64-bit signed)
    Int(i64),
    /// Floating point (64-bit)
    Float(f64),
    /// String
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Object (ordered map of string keys to values)
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Numbers and strings render; every other type does not
    pub fn as_rendered(&self) -> Option<Rendered> {
        match self {
            Value::Int(n) => Some(Rendered::Number(*n as f64)),
            Value::Float(n) => Some(Rendered::Number(*n)),
            Value::String(s) => Some(Rendered::String(s.clone())),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert a serde_json::Value to a CPE Value
    pub fn from_serde_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from_serde_json).collect())
            }
            serde_json::Value::Object(obj) => Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_serde_json(v)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_serde_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// The result of evaluating a template or expression
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Number(f64),
    String(String),
}

impl Rendered {
    /// The empty string every data miss renders as
    pub fn empty() -> Self {
        Rendered::String(String::new())
    }

    /// Numeric value for arithmetic: numbers as-is, strings parsed
    pub fn to_number(&self) -> f64 {
        match self {
            Rendered::Number(n) => *n,
            Rendered::String(s) => string_to_number(s),
        }
    }

    /// JSON form: integral numbers as integers, non-finite numbers as null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Rendered::String(s) => serde_json::Value::String(s.clone()),
            Rendered::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
                serde_json::Value::from(*n as i64)
            }
            Rendered::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| {
                    log::warn!("non-finite number ({}) written as null in JSON", format_number(*n));
                    serde_json::Value::Null
                }),
        }
    }
}

/// The canonical text form, used when results are concatenated
impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Number(n) => f.write_str(&format_number(*n)),
            Rendered::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Rendered {
    fn from(s: &str) -> Self {
        Rendered::String(s.to_string())
    }
}

impl From<f64> for Rendered {
    fn from(n: f64) -> Self {
        Rendered::Number(n)
    }
}

/// Format a number as decimal text: no trailing `.0` on integral values,
/// exponent notation outside `[1e-6, 1e21)`, and `Infinity`/`NaN` spelled out.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        // Covers negative zero
        return "0".to_string();
    }

    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return n.to_string();
    }

    let exp = format!("{:e}", n);
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{}e+{}", mantissa, power),
        _ => exp,
    }
}

/// Parse a string as a number the way arithmetic operands are coerced.
///
/// Surrounding whitespace is ignored and blank strings are zero. Accepts
/// decimal (with optional fraction and exponent), `0x`/`0o`/`0b` integers and
/// `Infinity`; anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }

    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return parse_radix(digits, radix);
        }
    }

    let decimal_chars = t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !decimal_chars {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    digits
        .chars()
        .try_fold(0.0_f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
        })
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bool(true).type_name(), "bool");
        assert_eq!(Value::Int(42).type_name(), "int");
        assert_eq!(Value::Float(3.5).type_name(), "float");
        assert_eq!(Value::String("hello".into()).type_name(), "string");
        assert_eq!(Value::Array(vec![]).type_name(), "array");
        assert_eq!(Value::Object(IndexMap::new()).type_name(), "object");
    }

    #[test]
    fn test_only_numbers_and_strings_render() {
        assert_eq!(Value::Int(4).as_rendered(), Some(Rendered::Number(4.0)));
        assert_eq!(Value::Float(0.5).as_rendered(), Some(Rendered::Number(0.5)));
        assert_eq!(Value::from("4").as_rendered(), Some(Rendered::from("4")));
        assert_eq!(Value::Null.as_rendered(), None);
        assert_eq!(Value::Bool(true).as_rendered(), None);
        assert_eq!(Value::Array(vec![Value::Int(1)]).as_rendered(), None);
        assert_eq!(Value::Object(IndexMap::new()).as_rendered(), None);
    }

    #[test]
    fn test_from_serde_json() {
        let value = Value::from_serde_json(serde_json::json!({"a": [1, 2.5, "x", null, true]}));
        let Value::Object(obj) = value else {
            panic!("expected object");
        };
        assert_eq!(
            obj["a"],
            Value::Array(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::String("x".into()),
                Value::Null,
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn test_from_conversions() {
        let _: Value = true.into();
        let _: Value = 42i64.into();
        let _: Value = 3.5f64.into();
        let _: Value = "hello".into();
        let _: Value = String::from("hello").into();
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1.0 / 3.0), "0.3333333333333333");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(123456789012.0), "123456789012");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("4"), 4.0);
        assert_eq!(string_to_number("  4.5 "), 4.5);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("   "), 0.0);
        assert_eq!(string_to_number("-2"), -2.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert_eq!(string_to_number(".5"), 0.5);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert_eq!(string_to_number("0b101"), 5.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("abc").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("nan").is_nan());
        assert!(string_to_number("0x").is_nan());
        assert!(string_to_number("-0x10").is_nan());
    }

    #[test]
    fn test_rendered_display() {
        assert_eq!(Rendered::Number(14.0).to_string(), "14");
        assert_eq!(Rendered::from("14").to_string(), "14");
    }

    #[test]
    fn test_rendered_json() {
        assert_eq!(Rendered::Number(5.0).to_json(), serde_json::json!(5));
        assert_eq!(Rendered::Number(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(Rendered::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Rendered::from("x").to_json(), serde_json::json!("x"));
    }
}
