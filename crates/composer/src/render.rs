//! Plain-text summary of a composed document.
//!
//! One `[Section Name]` block per section, in execution order. Objects
//! render as `key: value` lines, arrays as `- item` lines, nested values
//! indent by two spaces. Null and empty values are left out, so the same
//! document always renders to the same text.

use serde_json::Value;
use std::fmt::Write;

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.iter().all(is_empty),
        Value::Object(map) => map.values().all(is_empty),
        _ => false,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    let pad = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter().filter(|(_, v)| !is_empty(v)) {
                match scalar(item) {
                    Some(text) => {
                        let _ = writeln!(out, "{pad}{key}: {text}");
                    }
                    None => {
                        let _ = writeln!(out, "{pad}{key}:");
                        write_value(out, item, depth + 1);
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter().filter(|v| !is_empty(v)) {
                match scalar(item) {
                    Some(text) => {
                        let _ = writeln!(out, "{pad}- {text}");
                    }
                    None => {
                        let _ = writeln!(out, "{pad}-");
                        write_value(out, item, depth + 1);
                    }
                }
            }
        }
        other => {
            if let Some(text) = scalar(other) {
                let _ = writeln!(out, "{pad}{text}");
            }
        }
    }
}

/// Render `(section name, output)` pairs as a summary.
pub fn render_summary<'a>(sections: impl IntoIterator<Item = (&'a str, &'a Value)>) -> String {
    let mut out = String::with_capacity(2048);
    for (name, value) in sections {
        if is_empty(value) {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "[{name}]");
        write_value(&mut out, value, 0);
    }
    out
}
