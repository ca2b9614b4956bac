//! Structural merge of partial JSON updates into the snapshot.
//!
//! Objects recurse, everything else replaces:
//! ```text
//! target  {"a": {"y": 2}, "list": [9]}
//! source  {"a": {"x": 1}, "list": [1, 2]}
//! result  {"a": {"x": 1, "y": 2}, "list": [1, 2]}
//! ```
//!
//! Arrays are never merged element-wise. Servers push whole arrays.

use serde_json::{Map, Value};

/// Merge `source` into `target` in place and return `target`.
///
/// For every key in `source`:
/// - an object value is merged recursively into `target[key]`, which is
///   created as an empty object if absent or not already an object;
/// - any other value (scalar, array, null) replaces `target[key]`.
///
/// A non-object `source` replaces `target` entirely.
pub fn deep_merge<'a>(target: &'a mut Value, source: &Value) -> &'a mut Value {
    let Value::Object(incoming) = source else {
        *target = source.clone();
        return target;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(existing) = &mut *target {
        merge_maps(existing, incoming);
    }
    target
}

fn merge_maps(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(_) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                deep_merge(slot, value);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
