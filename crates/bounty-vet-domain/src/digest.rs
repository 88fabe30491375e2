//! Canonical JSON normalization and SHA-256 digests.
//!
//! Proof bundle checksums are computed over the canonical form so that two
//! bundles built from the same inputs agree byte for byte:
//! - object keys sorted by UTF-16 code units, recursively
//! - integer-valued floats written as integers; NaN/Infinity rejected
//! - compact output (no insignificant whitespace)

use crate::error::{DomainError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

fn normalize_value(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map.iter() {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => {
            let normalized = arr
                .iter()
                .map(normalize_value)
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::Value::Array(normalized))
        }
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(serde_json::Value::Number(n.clone()));
            }
            match n.as_f64() {
                Some(f) if !f.is_finite() => Err(DomainError::NonCanonical(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                )),
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
                }
                _ => Ok(serde_json::Value::Number(n.clone())),
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to canonical form: normalize numbers, sort keys, compact.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    let sorted = sort_keys_utf16(&normalized);
    Ok(serde_json::to_string(&sorted)?)
}

/// SHA-256 hex digest of the canonical JSON form of any serializable value.
pub fn canonical_digest<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let canonical = canonical_json(&value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// SHA-256 hex digest of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_field_order_invariant() {
        let a = json!({ "b": 1, "a": 2, "c": { "z": 1, "y": 2 } });
        let b = json!({ "c": { "y": 2, "z": 1 }, "a": 2, "b": 1 });
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(
            canonical_json(&a).unwrap(),
            r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#
        );
    }

    #[test]
    fn test_canonical_json_array_order_preserved() {
        let a = json!({ "files": ["b", "a"] });
        let b = json!({ "files": ["a", "b"] });
        assert_ne!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_integer_valued_float() {
        let input = json!({ "coverage": 80.0, "ratio": 0.5 });
        assert_eq!(
            canonical_json(&input).unwrap(),
            r#"{"coverage":80,"ratio":0.5}"#
        );
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_digest_deterministic() {
        #[derive(Serialize)]
        struct Payload {
            repo: String,
            pr: u64,
        }
        let p = Payload {
            repo: "acme/widgets".to_string(),
            pr: 42,
        };
        let d1 = canonical_digest(&p).unwrap();
        let d2 = canonical_digest(&json!({ "pr": 42, "repo": "acme/widgets" })).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }
}
