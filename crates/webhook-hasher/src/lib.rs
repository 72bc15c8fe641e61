//! Deterministic canonical hash of a webhook payload for conflict detection.
//!
//! Canonicalization sorts object keys lexicographically at every nesting
//! level and emits no insignificant whitespace, so two payloads that differ
//! only in key order or formatting hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash a JSON payload. Object keys are sorted recursively before hashing;
/// array order and scalar values are preserved as-is.
pub fn hash(payload: &Value) -> [u8; 32] {
    let canonical = canonicalize(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

/// Canonical JSON text for a payload: keys sorted recursively, compact
/// encoding. Exposed so callers can embed it in audit `details` messages.
pub fn canonicalize(payload: &Value) -> String {
    let sorted = sort_keys(payload);
    serde_json::to_string(&sorted).expect("sorted JSON value always serializes")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_payloads_hash_equal() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(hash(&a), hash(&b), "key order must not change the hash");
    }

    #[test]
    fn nested_key_order_does_not_affect_hash() {
        let a = json!({"outer": {"x": 1, "y": 2}, "z": 3});
        let b = json!({"z": 3, "outer": {"y": 2, "x": 1}});
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn different_values_hash_differently() {
        let a = json!({"v": 1});
        let b = json!({"v": 2});
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!({"list": [1, 2, 3]});
        let b = json!({"list": [3, 2, 1]});
        assert_ne!(hash(&a), hash(&b), "array order must be preserved");
    }
}
