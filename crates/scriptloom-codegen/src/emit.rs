//! Target-text emission helpers
//!
//! The compiler never evaluates templates: configuration strings are
//! carried through as opaque text and escaped for the target's
//! string-literal grammar. Strings carrying `{{path}}` placeholders are
//! emitted as `__interpolate(...)` expressions so the generated program
//! resolves them at run time.

use scriptloom_core::TemplateValue;

/// Escape a string into a double-quoted target string literal
pub fn js_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a template value as a target expression
///
/// Strings carrying placeholders become `__interpolate("...", ctx)` calls;
/// everything else renders as a literal. Nested objects and arrays are
/// walked so a placeholder anywhere in the structure still resolves.
pub fn js_template_expr(value: &TemplateValue) -> String {
    match value {
        TemplateValue::String(s) if s.contains("{{") => {
            format!("__interpolate({}, ctx)", js_str(s))
        }
        TemplateValue::Array(items) => {
            let rendered: Vec<String> = items.iter().map(js_template_expr).collect();
            format!("[{}]", rendered.join(", "))
        }
        TemplateValue::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", js_str(k), js_template_expr(v)))
                .collect();
            format!("{{ {} }}", rendered.join(", "))
        }
        other => js_literal(other),
    }
}

/// Render a template value as a plain literal, placeholders untouched
pub fn js_literal(value: &TemplateValue) -> String {
    match value {
        TemplateValue::Null => "null".to_string(),
        TemplateValue::Bool(b) => b.to_string(),
        TemplateValue::Number(n) => n.to_string(),
        TemplateValue::String(s) => js_str(s),
        TemplateValue::Array(items) => {
            let rendered: Vec<String> = items.iter().map(js_literal).collect();
            format!("[{}]", rendered.join(", "))
        }
        TemplateValue::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", js_str(k), js_literal(v)))
                .collect();
            format!("{{ {} }}", rendered.join(", "))
        }
    }
}
