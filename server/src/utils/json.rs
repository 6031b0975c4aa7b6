//! JSON helpers shared by the ingestion processors
//!
//! The core rule set for metadata: objects merge key-wise, arrays and
//! scalars replace wholesale, explicit null clears a key.

use serde_json::{Map, Value};

/// Deep-merge `patch` into `base` and return the result.
///
/// Rules:
/// - object + object: merged key-wise, recursing into nested objects
/// - `patch` null for a key: the key is removed
/// - anything else (arrays, scalars, type mismatch): `patch` replaces
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(a), Value::Object(b)) => {
            let mut merged: Map<String, Value> = a.clone();
            for (key, patch_value) in b {
                if patch_value.is_null() {
                    merged.remove(key);
                    continue;
                }
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => patch_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// Merge an optional stored metadata object with an optional incoming one.
///
/// Absent incoming metadata leaves the stored value untouched.
pub fn merge_metadata(stored: Option<&Value>, incoming: Option<&Value>) -> Option<Value> {
    match (stored, incoming) {
        (Some(a), Some(b)) => Some(deep_merge(a, b)),
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    }
}

/// Extract a finite f64 from a JSON number, rejecting NaN and infinities.
pub fn finite_f64(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_replaces_scalars() {
        let base = json!({"step": 1, "status": "started"});
        let patch = json!({"step": 2, "error": ""});
        let merged = deep_merge(&base, &patch);
        assert_eq!(merged, json!({"step": 2, "status": "started", "error": ""}));
    }

    #[test]
    fn merge_recurses_into_objects() {
        let base = json!({"ctx": {"a": 1, "b": 2}});
        let patch = json!({"ctx": {"b": 3, "c": 4}});
        let merged = deep_merge(&base, &patch);
        assert_eq!(merged, json!({"ctx": {"a": 1, "b": 3, "c": 4}}));
    }

    #[test]
    fn merge_replaces_arrays_whole() {
        let base = json!({"tags": [1, 2, 3]});
        let patch = json!({"tags": [4]});
        let merged = deep_merge(&base, &patch);
        assert_eq!(merged, json!({"tags": [4]}));
    }

    #[test]
    fn merge_null_clears_key() {
        let base = json!({"keep": 1, "drop": 2});
        let patch = json!({"drop": null});
        let merged = deep_merge(&base, &patch);
        assert_eq!(merged, json!({"keep": 1}));
    }

    #[test]
    fn merge_type_mismatch_replaces() {
        let base = json!({"v": {"nested": true}});
        let patch = json!({"v": "flat"});
        let merged = deep_merge(&base, &patch);
        assert_eq!(merged, json!({"v": "flat"}));
    }

    #[test]
    fn merge_metadata_handles_absent_sides() {
        let stored = json!({"a": 1});
        assert_eq!(merge_metadata(Some(&stored), None), Some(json!({"a": 1})));
        assert_eq!(merge_metadata(None, Some(&stored)), Some(json!({"a": 1})));
        assert_eq!(merge_metadata(None, None), None);
    }

    #[test]
    fn finite_f64_rejects_non_numbers() {
        assert_eq!(finite_f64(&json!(1.5)), Some(1.5));
        assert_eq!(finite_f64(&json!("1.5")), None);
        assert_eq!(finite_f64(&json!(null)), None);
    }
}
