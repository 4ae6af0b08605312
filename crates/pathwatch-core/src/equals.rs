#![forbid(unsafe_code)]

//! Reference and structural equality.
//!
//! Two comparison modes exist and each layer uses exactly one:
//!
//! | Mode | Function | Used by |
//! |------|----------|---------|
//! | strict / reference | [`same`] | key observation, dirty checking, `=` / `<>` |
//! | deep / structural | [`equals`] | key-path callbacks, expression subscriptions |

use ahash::AHashSet;

use crate::value::{ObjectId, Value};

/// Strict equality: primitives by value, handles by identity.
///
/// `NaN` is not equal to itself; strings compare by content.
#[must_use]
pub fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Function(x), Value::Function(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Deep structural equality with cycle tracking.
///
/// Objects are equal when they have the same key set and pairwise-equal
/// values (computed fields compare by their current value); arrays when they
/// have the same length and pairwise-equal elements. `NaN` equals `NaN` here,
/// so a value always equals its own deep clone. Functions compare by identity.
#[must_use]
pub fn equals(a: &Value, b: &Value) -> bool {
    let mut in_progress = AHashSet::new();
    deep_equals(a, b, &mut in_progress)
}

fn deep_equals(a: &Value, b: &Value, in_progress: &mut AHashSet<(ObjectId, ObjectId)>) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            // A pair already under comparison is assumed equal; any real
            // difference is reported by the outer frame.
            if !in_progress.insert((x.id(), y.id())) {
                return true;
            }
            let keys = x.keys();
            if keys != y.keys() {
                return false;
            }
            keys.iter()
                .all(|key| deep_equals(&x.get(key), &y.get(key), in_progress))
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            if !in_progress.insert((x.id(), y.id())) {
                return true;
            }
            let left = x.to_vec();
            let right = y.to_vec();
            left.len() == right.len()
                && left
                    .iter()
                    .zip(&right)
                    .all(|(l, r)| deep_equals(l, r, in_progress))
        }
        _ => same(a, b),
    }
}
