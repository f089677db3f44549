//! Order-independent JSON used as signing input.
//!
//! Every object key found anywhere in the value is gathered into one sorted,
//! deduplicated list, and each object is written by walking that list and
//! emitting the keys it actually has. Keys compare by UTF-16 code units so the
//! output matches a JavaScript `JSON.stringify` with the same key list.

use std::cmp::Ordering;

use serde_json::Value;
use uinveil_common::{Params, params_to_json};

/// Serializes `value` as compact canonical JSON.
///
/// # Examples
///
/// ```
/// use serde_json::json;
///
/// let a = json!({"uin": "42", "spec": {"w": 640, "h": 640}});
/// assert_eq!(
///     uinveil::canonicalize(&a),
///     r#"{"spec":{"h":640,"w":640},"uin":"42"}"#
/// );
/// ```
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut keys = Vec::new();
    collect_keys(value, &mut keys);
    keys.sort_by(|a, b| utf16_cmp(a, b));
    keys.dedup();

    let mut out = String::new();
    write_value(value, &keys, &mut out);
    out
}

/// Canonical JSON of a parameter map.
#[must_use]
pub fn canonicalize_params(params: &Params) -> String {
    canonicalize(&params_to_json(params))
}

fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn collect_keys<'a>(value: &'a Value, keys: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                keys.push(key);
                collect_keys(child, keys);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, keys);
            }
        }
        _ => {}
    }
}

fn write_value(value: &Value, keys: &[&str], out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut first = true;
            for key in keys {
                if let Some(child) = map.get(*key) {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    out.push_str(&Value::from(*key).to_string());
                    out.push(':');
                    write_value(child, keys, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, keys, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}
