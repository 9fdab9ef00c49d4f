//! Run-time template interpolation
//!
//! Substitutes `{{path}}` placeholders against the live execution context.
//! This mirrors the `__interpolate` helper the compiler embeds in every
//! bundle: string substitution only, no expressions, unresolved paths
//! become the empty string.

use scriptloom_core::TemplateValue;
use serde_json::Value;

/// Substitute every `{{path}}` placeholder in `template` from `ctx`
///
/// Paths are dot-separated object lookups. String values substitute as-is;
/// other values substitute as compact JSON; missing paths substitute as `""`.
pub fn interpolate(template: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                out.push_str(&render(lookup_path(ctx, path)));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder passes through verbatim.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve a dot-separated path against a JSON value
pub fn lookup_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = ctx;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Resolve a template value against the context, interpolating every string
///
/// Nested objects and arrays are walked; non-string leaves pass through.
pub fn render_template_value(tv: &TemplateValue, ctx: &Value) -> Value {
    match tv {
        TemplateValue::Null => Value::Null,
        TemplateValue::Bool(b) => Value::Bool(*b),
        TemplateValue::Number(n) => Value::Number(n.clone()),
        TemplateValue::String(s) => Value::String(interpolate(s, ctx)),
        TemplateValue::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_template_value(item, ctx))
                .collect(),
        ),
        TemplateValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_template_value(v, ctx)))
                .collect(),
        ),
    }
}
