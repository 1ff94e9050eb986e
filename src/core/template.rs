//! Merging schema-declared default templates into inserted values.

use serde_json::Value;

use crate::schema::path::merge;
use crate::schema::value::kind_name;

/// Merge `template` into a newly inserted `value`.
///
/// Maps deep-merge with the value winning. Sequences concatenate when
/// `concat` is set, else merge by position with the template's extra tail
/// kept. A primitive meeting a sequence template is wrapped as `[value]`
/// unless `strict_array_cast` is set. Every other pairing leaves the value
/// unchanged.
pub fn apply_template(
    value: Value,
    template: Option<&Value>,
    strict_array_cast: bool,
    concat: bool,
) -> Value {
    let Some(template) = template else {
        return value;
    };

    match (value, template) {
        (Value::Object(fields), Value::Object(_)) => {
            let mut merged = template.clone();
            merge(&mut merged, Value::Object(fields));
            merged
        }
        (Value::Array(items), Value::Array(defaults)) => merge_sequences(items, defaults, concat),
        (value @ (Value::Object(_) | Value::Array(_)), Value::Object(_) | Value::Array(_)) => {
            tracing::warn!(
                target: "narrative_state::template",
                value = kind_name(&value),
                template = kind_name(template),
                "template kind does not match inserted value, skipping"
            );
            value
        }
        (primitive, Value::Array(_)) if strict_array_cast => primitive,
        (primitive, Value::Array(defaults)) => merge_sequences(vec![primitive], defaults, concat),
        (value, _) => value,
    }
}

fn merge_sequences(mut items: Vec<Value>, defaults: &[Value], concat: bool) -> Value {
    if concat {
        items.extend(defaults.iter().cloned());
        return Value::Array(items);
    }
    if defaults.len() > items.len() {
        items.extend(defaults[items.len()..].iter().cloned());
    }
    Value::Array(items)
}
