//! Content signatures for duplicate detection.
//!
//! Two records created independently on different replicas get distinct ids
//! but describe the same thing. The signature is a canonical rendering of a
//! record's content with identity and bookkeeping fields stripped, so such
//! records hash to the same string.

use serde::Serialize;
use serde_json::Value;

/// Fields that differ between honest duplicates and must not contribute to
/// the signature.
const VOLATILE_KEYS: &[&str] = &["id", "createdAt", "updatedAt", "deleted"];

/// Compute the content signature of a record.
///
/// Returns `None` when the record cannot be rendered as a JSON object;
/// such records are never treated as duplicates of anything.
pub fn signature_of<T: Serialize>(record: &T) -> Option<String> {
    let value = serde_json::to_value(record).ok()?;
    if !value.is_object() {
        return None;
    }
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Some(out)
}

/// Render a value deterministically: object keys sorted, volatile keys
/// dropped at every nesting level, arrays of strings sorted (reference
/// lists carry no meaningful order for identity purposes).
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !VOLATILE_KEYS.contains(&k.as_str()))
                .collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys are serde-generated field names, safe to quote directly
                // via the JSON string encoder.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            if items.iter().all(Value::is_string) {
                let mut strings: Vec<&Value> = items.iter().collect();
                strings.sort_unstable_by_key(|v| v.as_str());
                out.push('[');
                for (i, item) in strings.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&item.to_string());
                }
                out.push(']');
            } else {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_canonical(item, out);
                }
                out.push(']');
            }
        }
        other => out.push_str(&other.to_string()),
    }
}
