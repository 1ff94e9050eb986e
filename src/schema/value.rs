//! Value helpers shared by the parser, schema engine and executor.

use serde_json::{Number, Value};

/// Literal array element that marks its array as schema-extensible.
pub const EXTENSIBLE_MARKER: &str = "$__META_EXTENSIBLE__$";
/// Map key carrying transient inference metadata.
pub const META_KEY: &str = "$meta";
/// Flag key identifying an array-level metadata sentinel element.
pub const ARRAY_META_KEY: &str = "$arrayMeta";

/// Significant digits kept when rounding arithmetic results.
pub const SIGNIFICANT_DIGITS: usize = 12;

/// How a stored value is addressed by `set` and `add`.
///
/// A two-element sequence whose second slot is a string is an annotated
/// scalar (`[value, description]`); the classification is made once per
/// read rather than re-inspected at every call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot<'a> {
    Described { value: &'a Value, description: &'a str },
    Plain(&'a Value),
}

impl<'a> Slot<'a> {
    pub fn classify(value: &'a Value) -> Slot<'a> {
        if let Value::Array(items) = value {
            if let [inner, Value::String(description)] = items.as_slice() {
                return Slot::Described {
                    value: inner,
                    description,
                };
            }
        }
        Slot::Plain(value)
    }

    /// The annotated slot, when it holds a primitive that can be updated in place.
    pub fn scalar_slot(&self) -> Option<&'a Value> {
        match self {
            Slot::Described { value, .. } if !is_composite(value) => Some(value),
            _ => None,
        }
    }
}

/// Maps and sequences are composite; everything else is a primitive.
pub fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Short type name used in error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Round to `digits` significant digits, leaving zero and non-finite input untouched.
pub fn round_significant(x: f64, digits: usize) -> f64 {
    if x == 0.0 || !x.is_finite() || digits == 0 {
        return x;
    }
    format!("{:.*e}", digits - 1, x).parse().unwrap_or(x)
}

/// Build a JSON number, preferring an integer representation when exact.
pub fn number_value(x: f64) -> Option<Value> {
    if !x.is_finite() {
        return None;
    }
    if x.fract() == 0.0 && x.abs() < 9.007_199_254_740_992e15 {
        return Some(Value::from(x as i64));
    }
    Number::from_f64(x).map(Value::Number)
}

/// Structural equality that treats `80` and `80.0` as the same number.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Numeric cast applied when a numeric slot receives new input.
///
/// Numbers pass through, numeric strings are parsed, booleans become 1/0.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|x| x.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Render a number the way the diff strings show it: `80`, `0.5`, `-3`.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 9.007_199_254_740_992e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

/// Human-readable rendering used in diff strings.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_described_pair() {
        let v = json!([100, "hit points"]);
        match Slot::classify(&v) {
            Slot::Described { value, description } => {
                assert_eq!(value, &json!(100));
                assert_eq!(description, "hit points");
            }
            Slot::Plain(_) => panic!("expected a described slot"),
        }
        assert_eq!(Slot::classify(&v).scalar_slot(), Some(&json!(100)));
    }

    #[test]
    fn classify_plain_values() {
        assert!(matches!(Slot::classify(&json!([1, 2])), Slot::Plain(_)));
        assert!(matches!(Slot::classify(&json!(["a", "b", "c"])), Slot::Plain(_)));
        assert!(matches!(Slot::classify(&json!("x")), Slot::Plain(_)));
    }

    #[test]
    fn described_composite_has_no_scalar_slot() {
        let v = json!([{"a": 1}, "desc"]);
        assert!(Slot::classify(&v).scalar_slot().is_none());
    }

    #[test]
    fn rounding_suppresses_float_drift() {
        assert_eq!(round_significant(0.1 + 0.2, SIGNIFICANT_DIGITS), 0.3);
        assert_eq!(round_significant(1.0 / 3.0, SIGNIFICANT_DIGITS), 0.333333333333);
        assert_eq!(round_significant(0.0, SIGNIFICANT_DIGITS), 0.0);
    }

    #[test]
    fn number_value_prefers_integers() {
        assert_eq!(number_value(75.0), Some(json!(75)));
        assert_eq!(number_value(2.5), Some(json!(2.5)));
        assert_eq!(number_value(f64::NAN), None);
    }

    #[test]
    fn coerce_number_casts() {
        assert_eq!(coerce_number(&json!("80")), Some(80.0));
        assert_eq!(coerce_number(&json!(" 1.5 ")), Some(1.5));
        assert_eq!(coerce_number(&json!(true)), Some(1.0));
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn deep_equal_ignores_number_representation() {
        assert!(deep_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!deep_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn display_rendering() {
        assert_eq!(display_value(&json!(100)), "100");
        assert_eq!(display_value(&json!(0.5)), "0.5");
        assert_eq!(display_value(&json!("sword")), "sword");
        assert_eq!(display_value(&json!(["a"])), "[\"a\"]");
    }
}
