//! Evaluator for CPE
//!
//! The evaluator walks a parsed [`Template`] against an [`Environment`] and
//! produces a [`Rendered`] value. It holds no state between calls: the same
//! tree and environment always give the same result.
//!
//! Data problems (unknown source, bad rank, missing field, unrenderable value)
//! become the empty string. Only trees that the parser could not have built
//! produce an error.

pub mod value;

use crate::environment::{resolve_query, Environment};
use crate::errors::{CpeError, CpeResult};
use crate::parser::ast::{BinaryExpr, BinaryOp, Expr, Reference, Segment, Template};

pub use value::{Rendered, Value};

/// Evaluator bound to one environment
pub struct Evaluator<'e> {
    env: &'e dyn Environment,
}

impl<'e> Evaluator<'e> {
    /// Create a new evaluator
    pub fn new(env: &'e dyn Environment) -> Self {
        Self { env }
    }

    /// Evaluate a whole parse result
    pub fn evaluate(&self, template: &Template) -> CpeResult<Rendered> {
        match template {
            Template::Literal(text) => Ok(Rendered::String(text.clone())),
            Template::Single(expr) => self.eval_expr(expr),
            Template::Composite(segments) => {
                let mut result = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => result.push_str(text),
                        Segment::Code(expr) => {
                            let value = self.eval_expr(expr)?;
                            result.push_str(&value.to_string());
                        }
                    }
                }
                Ok(Rendered::String(result))
            }
        }
    }

    /// Evaluate one expression tree
    pub fn eval_expr(&self, expr: &Expr) -> CpeResult<Rendered> {
        match expr {
            Expr::Number(n) => Ok(Rendered::Number(*n as f64)),
            Expr::String(s) => Ok(Rendered::String(s.clone())),
            Expr::Ref(reference) => self.eval_reference(reference),
            Expr::Binary(bin) => self.eval_binary(bin),
        }
    }

    fn eval_reference(&self, reference: &Reference) -> CpeResult<Rendered> {
        reference.validate().map_err(|reason| {
            let ast = Expr::Ref(reference.clone()).to_json().to_string();
            CpeError::invalid_ast(ast, reason)
        })?;

        Ok(resolve_query(
            self.env,
            &reference.name,
            reference.rank,
            &reference.field,
        ))
    }

    /// Evaluate a binary expression. Operands are always coerced to numbers,
    /// so `+` never concatenates strings.
    fn eval_binary(&self, bin: &BinaryExpr) -> CpeResult<Rendered> {
        let left = self.eval_expr(&bin.left)?.to_number();
        let right = self.eval_expr(&bin.right)?.to_number();

        let result = match bin.op {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            // IEEE semantics: x/0 is ±Infinity, 0/0 is NaN
            BinaryOp::Div => left / right,
        };

        Ok(Rendered::Number(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EmptyEnvironment, QueryTable};
    use crate::template::parse;
    use serde_json::json;

    fn env() -> QueryTable {
        QueryTable::from_json(json!({
            "products": [
                {"name": "Widget", "quantity": 4, "price": "2.50"},
                {"name": "Gadget", "quantity": "4", "category": "tools"},
            ]
        }))
        .unwrap()
    }

    fn eval(source: &str) -> Rendered {
        let env = env();
        Evaluator::new(&env).evaluate(&parse(source)).unwrap()
    }

    #[test]
    fn test_literals_evaluate_to_themselves() {
        assert_eq!(eval("plain"), Rendered::from("plain"));
        assert_eq!(eval("{{0}}"), Rendered::Number(0.0));
        assert_eq!(eval("{{-3}}"), Rendered::Number(-3.0));
        assert_eq!(eval(r#"{{"{"}}"#), Rendered::from("{"));
    }

    #[test]
    fn test_references() {
        assert_eq!(eval("{{products[1].name}}"), Rendered::from("Widget"));
        assert_eq!(eval("{{products[1].quantity}}"), Rendered::Number(4.0));
        assert_eq!(eval("{{products[3].name}}"), Rendered::empty());
        assert_eq!(eval("{{products[1].category}}"), Rendered::empty());
        assert_eq!(eval("{{orders[1].id}}"), Rendered::empty());
    }

    #[test]
    fn test_composite_concatenates() {
        assert_eq!(
            eval("A {{products[2].name}} is in {{products[2].category}}"),
            Rendered::from("A Gadget is in tools")
        );
        assert_eq!(
            eval("{{1 + products[2].quantity / 2}}-ball"),
            Rendered::from("3-ball")
        );
        assert_eq!(eval("x{{7 / 2}}"), Rendered::from("x3.5"));
    }

    #[test]
    fn test_addition_is_numeric() {
        assert_eq!(
            eval("{{products[2].quantity + products[2].quantity}}"),
            Rendered::Number(8.0)
        );
        assert_eq!(eval(r#"{{"1" + "4"}}"#), Rendered::Number(5.0));
        assert_eq!(eval("{{products[1].price * 2}}"), Rendered::Number(5.0));
    }

    #[test]
    fn test_missing_values_count_as_zero() {
        assert_eq!(eval("{{1 + products[9].quantity}}"), Rendered::Number(1.0));
    }

    #[test]
    fn test_non_numeric_strings_give_nan() {
        let result = eval("{{products[1].name * 2}}");
        assert!(result.to_number().is_nan());
        assert_eq!(eval("={{products[1].name - 1}}"), Rendered::from("=NaN"));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("{{1 / 0}}"), Rendered::Number(f64::INFINITY));
        assert_eq!(eval("{{-1 / 0}}"), Rendered::Number(f64::NEG_INFINITY));
        assert!(eval("{{0 / 0}}").to_number().is_nan());
        assert_eq!(eval("{{1 / 0}}!"), Rendered::from("Infinity!"));
    }

    #[test]
    fn test_hand_built_invalid_reference() {
        let evaluator = Evaluator::new(&EmptyEnvironment);
        for bad in [
            Expr::reference("", 1, "name"),
            Expr::reference("products", 0, "name"),
            Expr::reference("products", 1, ""),
        ] {
            let err = evaluator.eval_expr(&bad).unwrap_err();
            assert!(matches!(err, CpeError::InvalidAst { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_invalid_reference_inside_tree_is_fatal() {
        let tree = Template::Composite(vec![
            Segment::Text("total: ".into()),
            Segment::Code(Expr::binary(
                BinaryOp::Add,
                Expr::Number(1),
                Expr::reference("products", -1, "quantity"),
            )),
        ]);
        let env = env();
        let err = Evaluator::new(&env).evaluate(&tree).unwrap_err();
        match err {
            CpeError::InvalidAst { ast, .. } => assert!(ast.contains("\"rank\":-1")),
            other => panic!("expected InvalidAst, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let env = env();
        let template = parse("{{products[1].name}} x{{products[1].quantity * 3}}");
        let evaluator = Evaluator::new(&env);
        let first = evaluator.evaluate(&template).unwrap();
        let second = evaluator.evaluate(&template).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Rendered::from("Widget x12"));
    }
}
