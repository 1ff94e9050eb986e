//! Typed value resolution for raw command arguments.
//!
//! Resolution order, first match wins: keyword, strict JSON, object/array
//! literal, math expression, YAML, and finally the text with one layer of
//! quoting trimmed. Nothing here fails outwardly.

use rand::rngs::StdRng;
use serde_json::Value;

use super::expr::{parse_expression, Expr};
use super::literal::parse_literal;
use super::math::{Evaluator, MathValue};
use crate::schema::value::{number_value, round_significant, SIGNIFICANT_DIGITS};

/// Resolve one raw argument, still quoted or bracketed as written.
pub fn parse_command_value(raw: &str, rng: &mut StdRng) -> Value {
    let text = raw.trim();
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "undefined" => return Value::Null,
        _ => {}
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }
    if let Ok(value @ (Value::Object(_) | Value::Array(_))) = parse_literal(text) {
        return value;
    }
    if let Some(value) = evaluate(text, rng) {
        return value;
    }
    if let Ok(value) = serde_yaml::from_str::<Value>(text) {
        return value;
    }
    Value::String(trim_quotes(text).to_string())
}

/// Math step. Bare strings and unresolvable input fall through.
fn evaluate(text: &str, rng: &mut StdRng) -> Option<Value> {
    let expr = match parse_expression(text) {
        Ok(Expr::Text(_)) => return None,
        Ok(expr) => expr,
        Err(e) => {
            tracing::trace!(target: "narrative_state::parser", input = text, error = %e, "not an expression");
            return None;
        }
    };
    let result = match Evaluator::new(rng).eval(&expr) {
        Ok(result) => result,
        Err(e) => {
            tracing::trace!(target: "narrative_state::parser", input = text, error = %e, "expression did not evaluate");
            return None;
        }
    };
    match result {
        MathValue::Number(x) => number_value(round_significant(x, SIGNIFICANT_DIGITS)),
        other => Some(Value::String(other.to_string())),
    }
}

/// Resolve a path argument. Paths are never evaluated as expressions.
pub fn parse_path_argument(raw: &str) -> String {
    let text = raw.trim();
    if let Ok(path) = serde_json::from_str::<String>(text) {
        return path;
    }
    if text.starts_with(['\'', '`']) {
        if let Ok(Value::String(path)) = parse_literal(text) {
            return path;
        }
    }
    trim_quotes(text).to_string()
}

/// Drop one leading and one trailing quote or backslash.
fn trim_quotes(text: &str) -> &str {
    let is_wrapper = |c: char| matches!(c, '\'' | '"' | '`' | '\\');
    let text = text.strip_prefix(is_wrapper).unwrap_or(text);
    text.strip_suffix(is_wrapper).unwrap_or(text)
}
