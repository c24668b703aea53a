//! # Canonical JSON
//!
//! Seals and sync hashes are computed over a canonical rendering of JSON:
//! object keys sorted recursively, compact separators. The rendering does not
//! depend on the insertion order of the in-memory maps, so the same logical
//! value always produces the same digest.

use crate::FabricaError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Rebuild a JSON value with every object's keys in sorted order.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Render any serializable value as canonical JSON text.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, FabricaError> {
    let value =
        serde_json::to_value(value).map_err(|e| FabricaError::SerializationError(e.to_string()))?;
    serde_json::to_string(&canonicalize(&value))
        .map_err(|e| FabricaError::SerializationError(e.to_string()))
}

/// Lowercase hex SHA-256 of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical JSON rendering of a value.
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> Result<String, FabricaError> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_digest() {
        let a = json!({"b": 1, "a": {"y": [1, {"q": 1, "p": 2}], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, {"p": 2, "q": 1}]}, "b": 1});

        assert_eq!(
            canonical_digest(&a).expect("digest"),
            canonical_digest(&b).expect("digest")
        );
    }

    #[test]
    fn canonical_text_is_sorted_and_compact() {
        let text = canonical_json(&json!({"z": 1, "a": [true, "s"]})).expect("render");
        assert_eq!(text, r#"{"a":[true,"s"],"z":1}"#);
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(
            canonical_digest(&json!([1, 2])).expect("digest"),
            canonical_digest(&json!([2, 1])).expect("digest")
        );
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
