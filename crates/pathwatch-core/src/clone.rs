#![forbid(unsafe_code)]

//! Shallow and deep copies of values.
//!
//! Snapshots taken for later comparison use [`deep_clone`], so that in-place
//! mutation of the live value cannot alter the snapshot.

use ahash::AHashMap;

use crate::value::{Array, Object, ObjectId, Value};

/// Copy the top-level container; nested handles stay shared.
///
/// Computed fields are copied as fields (the copy keeps the getter).
/// Primitives and functions are returned as-is.
#[must_use]
pub fn shallow_clone(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let copy = Object::new();
            for (key, field) in object.entries() {
                copy.define_raw(key, field);
            }
            Value::Object(copy)
        }
        Value::Array(array) => Value::Array(Array::from_vec(array.to_vec())),
        other => other.clone(),
    }
}

/// Recursively copy a value graph.
///
/// Aliasing and cycles are preserved: a container reached twice maps to the
/// same copy. Computed fields are evaluated and stored as plain values.
#[must_use]
pub fn deep_clone(value: &Value) -> Value {
    let mut copies = AHashMap::new();
    deep_clone_with(value, &mut copies)
}

fn deep_clone_with(value: &Value, copies: &mut AHashMap<ObjectId, Value>) -> Value {
    match value {
        Value::Object(object) => {
            if let Some(copy) = copies.get(&object.id()) {
                return copy.clone();
            }
            let copy = Object::new();
            copies.insert(object.id(), Value::Object(copy.clone()));
            for key in object.keys() {
                let field_value = object.get(&key);
                copy.set_raw(key, deep_clone_with(&field_value, copies));
            }
            Value::Object(copy)
        }
        Value::Array(array) => {
            if let Some(copy) = copies.get(&array.id()) {
                return copy.clone();
            }
            let copy = Array::new();
            copies.insert(array.id(), Value::Array(copy.clone()));
            let items = array
                .to_vec()
                .iter()
                .map(|item| deep_clone_with(item, copies))
                .collect();
            copy.replace_raw(items);
            Value::Array(copy)
        }
        other => other.clone(),
    }
}
