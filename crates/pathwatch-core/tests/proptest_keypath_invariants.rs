#![forbid(unsafe_code)]

//! Property-based invariant tests for the key-path codec and value copies.
//!
//! 1. `to_keys(to_key_path(k)) == k` for any non-empty key list.
//! 2. Encoded paths never contain an unescaped separator inside a key.
//! 3. A deep clone is structurally equal to its source.
//! 4. A deep clone shares no container identity with its source.

use pathwatch_core::{Array, Object, Value, deep_clone, equals, to_key_path, to_keys};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

/// Keys biased toward the characters the codec treats specially.
fn key() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{0,6}",
        "[.^a]{0,6}",
        any::<String>(),
    ]
}

fn key_list() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(key(), 1..8)
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i32..1000).prop_map(Value::from),
        "[a-z]{0,5}".prop_map(Value::from),
    ]
}

fn value_tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            proptest::collection::vec(("[a-c]", inner), 0..4).prop_map(|fields| {
                let object = Object::new();
                for (k, v) in fields {
                    object.set_raw(k, v);
                }
                Value::Object(object)
            }),
        ]
    })
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn collect_ids(value: &Value, out: &mut Vec<u64>) {
    match value {
        Value::Object(object) => {
            out.push(object.id().get());
            for key in object.keys() {
                collect_ids(&object.get(&key), out);
            }
        }
        Value::Array(array) => {
            out.push(array.id().get());
            for item in array.to_vec() {
                collect_ids(&item, out);
            }
        }
        _ => {}
    }
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn key_path_round_trips(keys in key_list()) {
        let path = to_key_path(&keys);
        prop_assert_eq!(to_keys(&path), keys);
    }

    #[test]
    fn segment_count_matches_key_count(keys in key_list()) {
        let path = to_key_path(&keys);
        prop_assert_eq!(to_keys(&path).len(), keys.len());
    }

    #[test]
    fn deep_clone_is_structurally_equal(value in value_tree()) {
        let copy = deep_clone(&value);
        prop_assert!(equals(&copy, &value));
    }

    #[test]
    fn deep_clone_shares_no_containers(value in value_tree()) {
        let copy = deep_clone(&value);
        let mut source_ids = Vec::new();
        let mut copy_ids = Vec::new();
        collect_ids(&value, &mut source_ids);
        collect_ids(&copy, &mut copy_ids);
        prop_assert_eq!(source_ids.len(), copy_ids.len());
        for id in &copy_ids {
            prop_assert!(!source_ids.contains(id));
        }
    }

    #[test]
    fn mutating_source_breaks_equality_with_clone(items in proptest::collection::vec(0i32..10, 0..6)) {
        let array = Array::from_values(items);
        let copy = deep_clone(&Value::Array(array.clone()));
        array.set_raw(array.len(), "extra");
        prop_assert!(!equals(&copy, &Value::Array(array)));
    }
}
