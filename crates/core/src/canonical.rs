//! Canonical JSON encoding and content hashing.
//!
//! Both the Audit Log hash chain and the e-signature content hash need a
//! single deterministic byte representation of a JSON value: object keys
//! sorted recursively, numbers printed in their shortest round-tripping
//! form, and no insignificant whitespace. `serde_json::to_string` alone does
//! not guarantee key order (it preserves insertion order unless the
//! `preserve_order` feature is off, in which case map iteration order is the
//! `BTreeMap` default — still not documented as a stability guarantee), so
//! we normalize explicitly rather than rely on incidental behavior.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `value` as canonical JSON bytes.
///
/// Object keys are sorted lexicographically at every nesting level. Arrays
/// keep their order (order is significant). Numbers are re-emitted via
/// `serde_json`'s own formatter, which already produces the shortest
/// round-tripping representation for both integers and floats.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

/// Convenience wrapper returning canonical JSON as a `String`.
///
/// # Panics
///
/// Never panics: canonical output is always valid UTF-8 since it is built
/// from `serde_json`'s own string escaping.
pub fn canonicalize_string(value: &Value) -> String {
    String::from_utf8(canonicalize(value)).expect("canonical JSON is valid UTF-8")
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            // serde_json's compact Display for scalars is already canonical:
            // no extra whitespace, shortest-round-trip numbers, standard
            // string escaping.
            out.extend_from_slice(value.to_string().as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&Value::String((*key).clone()), out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
    }
}

/// SHA-256 of a value's canonical JSON encoding.
pub fn content_hash(value: &Value) -> [u8; 32] {
    let bytes = canonicalize(value);
    let digest = Sha256::digest(&bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Lowercase-hex encoding of a content hash, as stored/transmitted.
pub fn content_hash_hex(value: &Value) -> String {
    hex::encode(content_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_recursively() {
        let value = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonicalize_string(&value), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn preserves_array_order() {
        let value = json!([3, 1, 2]);
        assert_eq!(canonicalize_string(&value), "[3,1,2]");
    }

    #[test]
    fn no_insignificant_whitespace() {
        let value = json!({"a": 1, "b": [1, 2, 3]});
        let rendered = canonicalize_string(&value);
        assert!(!rendered.contains(' '));
        assert!(!rendered.contains('\n'));
    }

    #[test]
    fn same_value_different_key_order_hashes_identically() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9_ ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_is_idempotent(value in arb_json()) {
            let once = canonicalize_string(&value);
            let twice_value: Value = serde_json::from_str(&once).unwrap();
            let twice = canonicalize_string(&twice_value);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn canonical_round_trips_through_parse(value in arb_json()) {
            let rendered = canonicalize_string(&value);
            let parsed: Value = serde_json::from_str(&rendered).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
