#![forbid(unsafe_code)]

//! Mediated mutation.
//!
//! Observers only hear about writes that go through this module. Each
//! operation performs the raw write, then notifies the affected keys with
//! their previous values, then requests a dirty check if any computed key is
//! tracked (a stored write may change what a getter returns).

use std::cmp::Ordering;

use pathwatch_core::{Array, Field, MAX_ARRAY_LENGTH, Value, array_index, same, to_keys};
use tracing::debug;

use crate::observer::{self, execute_callbacks};
use crate::scheduler::{schedule_check, schedule_sweep};

fn after_mutation() {
    if observer::has_tracked_computed() {
        schedule_check();
    } else {
        schedule_sweep();
    }
}

/// Set `key` on `target` and notify its observers.
///
/// On objects, assigning over a computed field replaces it with a stored
/// value. On arrays, `key` must be a canonical index or `length`; other keys
/// are ignored. Non-containers are ignored.
pub fn assign(target: &Value, key: &str, value: impl Into<Value>) {
    let value = value.into();
    match target {
        Value::Object(object) => {
            let old = object.get(key);
            let was_computed = object.is_computed(key);
            object.set_raw(key, value);
            if was_computed {
                observer::sync_computed(target, key);
            }
            execute_callbacks(target, key, &old);
        }
        Value::Array(array) => {
            let written = if key == "length" {
                let len = value.to_number();
                if !(len >= 0.0 && len.fract() == 0.0 && len <= f64::from(MAX_ARRAY_LENGTH)) {
                    debug!(len, "ignoring invalid array length");
                    return;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let len = len as usize;
                mutate_array(array, |items| resize_slots(items, len))
            } else if let Some(index) = array_index(key) {
                mutate_array(array, |items| {
                    let Some(len) = index.checked_add(1) else {
                        return false;
                    };
                    if index >= items.len() && !resize_slots(items, len) {
                        return false;
                    }
                    items[index] = value;
                    true
                })
            } else {
                debug!(key, "ignoring non-index array key");
                return;
            };
            if !written {
                debug!(key, "array too large to grow; write ignored");
                return;
            }
        }
        _ => {
            debug!(kind = target.type_name(), key, "assign on a non-container");
            return;
        }
    }
    after_mutation();
}

/// Write `value` at the end of `path`, resolving the intermediate levels.
///
/// Returns `false` when the parent of the last key is not a container.
pub fn assign_path(root: &Value, path: &str, value: impl Into<Value>) -> bool {
    let keys = to_keys(path);
    let Some((last, parents)) = keys.split_last() else {
        return false;
    };
    let parent = pathwatch_core::resolve(root, parents);
    if !parent.is_object_like() {
        return false;
    }
    assign(&parent, last, value);
    true
}

/// Delete `key` from `target` and notify its observers.
///
/// On arrays this clears the slot to `undefined`; the length is unchanged.
pub fn remove(target: &Value, key: &str) {
    match target {
        Value::Object(object) => {
            let old = object.get(key);
            if object.remove_raw(key).is_none() {
                return;
            }
            observer::sync_computed(target, key);
            execute_callbacks(target, key, &old);
        }
        Value::Array(array) => {
            let Some(index) = array_index(key).filter(|&index| index < array.len()) else {
                return;
            };
            mutate_array(array, |items| items[index] = Value::Undefined);
        }
        _ => return,
    }
    after_mutation();
}

/// Define `key` as a stored or computed field and notify its observers.
///
/// Defining a computed field on an observed key starts dirty checking it;
/// replacing it with a stored one stops. Arrays accept only stored fields.
pub fn define(target: &Value, key: &str, field: Field) {
    let Value::Object(object) = target else {
        match field {
            Field::Stored(value) => assign(target, key, value),
            Field::Computed(_) => debug!(key, "computed fields need an object"),
        }
        return;
    };
    let old = object.get(key);
    object.define_raw(key, field);
    observer::sync_computed(target, key);
    observer::refresh_snapshot(object, key);
    execute_callbacks(target, key, &old);
    after_mutation();
}

/// Request a dirty check of every tracked computed field.
///
/// Use after changing state that getters read but that lives outside any
/// mediated container.
pub fn refresh() {
    schedule_check();
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

/// Apply `op` to a copy of the items, store it, and notify every index whose
/// value changed plus `length` when the length changed.
///
/// `op` runs with no borrow held on the array, so comparators may read it.
fn mutate_array<R>(array: &Array, op: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    let mut items = array.to_vec();
    let before = items.clone();
    let result = op(&mut items);
    array.replace_raw(items);
    notify_array_diff(array, &before);
    result
}

/// Grow or shrink to `len` slots; `false` when the memory is unavailable.
fn resize_slots(items: &mut Vec<Value>, len: usize) -> bool {
    if let Some(extra) = len.checked_sub(items.len()) {
        if items.try_reserve_exact(extra).is_err() {
            return false;
        }
    }
    items.resize(len, Value::Undefined);
    true
}

fn notify_array_diff(array: &Array, before: &[Value]) {
    let target = Value::Array(array.clone());
    let after_len = array.len();
    for index in 0..before.len().max(after_len) {
        let old = before.get(index).cloned().unwrap_or_default();
        if !same(&old, &array.get(index)) {
            execute_callbacks(&target, &index.to_string(), &old);
        }
    }
    if before.len() != after_len {
        execute_callbacks(&target, "length", &Value::from(before.len()));
    }
}

/// Default sort order: display strings ascending, `undefined` last.
fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_display().cmp(&b.to_display()),
    }
}

/// Observed array mutation. Every method notifies changed indices and
/// `length` the same way [`assign`] does.
pub trait ArrayMutations {
    /// Append; returns the new length.
    fn push(&self, value: impl Into<Value>) -> usize;

    /// Remove the last item; `undefined` when empty.
    fn pop(&self) -> Value;

    /// Remove the first item; `undefined` when empty.
    fn shift(&self) -> Value;

    /// Prepend `values` in order; returns the new length.
    fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize;

    /// Remove `delete_count` items at `start` and insert `items` there.
    /// Both bounds are clamped. Returns the removed items.
    fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value>;

    fn reverse(&self);

    /// Sort by display string, `undefined` last.
    fn sort(&self);

    fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering);
}

impl ArrayMutations for Array {
    fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        let len = mutate_array(self, |items| {
            items.push(value);
            items.len()
        });
        after_mutation();
        len
    }

    fn pop(&self) -> Value {
        if self.is_empty() {
            return Value::Undefined;
        }
        let popped = mutate_array(self, Vec::pop).unwrap_or_default();
        after_mutation();
        popped
    }

    fn shift(&self) -> Value {
        if self.is_empty() {
            return Value::Undefined;
        }
        let shifted = mutate_array(self, |items| items.remove(0));
        after_mutation();
        shifted
    }

    fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        if values.is_empty() {
            return self.len();
        }
        let len = mutate_array(self, |items| {
            items.splice(0..0, values);
            items.len()
        });
        after_mutation();
        len
    }

    fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let inserted: Vec<Value> = items.into_iter().collect();
        let removed = mutate_array(self, |current| {
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            current.splice(start..end, inserted).collect::<Vec<_>>()
        });
        after_mutation();
        removed
    }

    fn reverse(&self) {
        mutate_array(self, |items| items.reverse());
        after_mutation();
    }

    fn sort(&self) {
        self.sort_by(default_order);
    }

    fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        mutate_array(self, |items| items.sort_by(|a, b| compare(a, b)));
        after_mutation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{Callback, Key, observe};
    use pathwatch_core::{Object, run_microtasks};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(String, Value, Value)>>>;

    fn watch_keys(target: &Value) -> Log {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let callback = Callback::new(move |change| {
            sink.borrow_mut()
                .push((change.key.to_string(), change.old.clone(), change.value()));
        });
        observe(target, Key::Any, &callback);
        log
    }

    fn keys(log: &Log) -> Vec<String> {
        log.borrow().iter().map(|(key, _, _)| key.clone()).collect()
    }

    #[test]
    fn assign_notifies_with_old_value() {
        let target = Value::from(Object::new().with("a", 1));
        let log = watch_keys(&target);
        assign(&target, "a", 2);
        assign(&target, "a", 2);
        assert_eq!(
            *log.borrow(),
            vec![("a".to_string(), Value::from(1), Value::from(2))]
        );
    }

    #[test]
    fn out_of_range_array_keys_are_ignored() {
        let array = Array::from_values([1]);
        let target = Value::from(array.clone());
        let log = watch_keys(&target);
        assign(&target, "18446744073709551615", 2);
        assign(&target, "4294967295", 2);
        assign(&target, "length", 1e18);
        assign(&target, "length", f64::INFINITY);
        assert!(log.borrow().is_empty());
        assert_eq!(array.to_vec(), vec![Value::from(1)]);

        assign(&target, "2", 3);
        assert_eq!(keys(&log), vec!["2", "length"]);
        assert_eq!(array.len(), 3);
    }

    #[test]
    fn assign_over_computed_replaces_it() {
        let object = Object::new().with_getter("c", |_| Value::from(1));
        let target = Value::from(object.clone());
        let callback = Callback::new(|_| {});
        observe(&target, "c", &callback);
        assert_eq!(observer::computed_object_count(), 1);

        assign(&target, "c", 5);
        assert!(!object.is_computed("c"));
        assert_eq!(observer::computed_object_count(), 0);
        run_microtasks();
    }

    #[test]
    fn remove_only_notifies_existing_keys() {
        let target = Value::from(Object::new().with("a", 1));
        let log = watch_keys(&target);
        remove(&target, "missing");
        remove(&target, "a");
        assert_eq!(keys(&log), vec!["a"]);
        assert_eq!(target.get("a"), Value::Undefined);
    }

    #[test]
    fn define_computed_starts_tracking() {
        let target = Value::from(Object::new().with("k", 1));
        let callback = Callback::new(|_| {});
        observe(&target, "k", &callback);
        define(&target, "k", Field::computed(|_| Value::from(9)));
        assert_eq!(observer::tracked_computed_keys(&target), vec!["k"]);
        define(&target, "k", Field::stored(3));
        assert!(observer::tracked_computed_keys(&target).is_empty());
        run_microtasks();
    }

    #[test]
    fn push_notifies_index_and_length() {
        let array = Array::from_values([1, 2]);
        let log = watch_keys(&Value::from(array.clone()));
        assert_eq!(array.push(3), 3);
        assert_eq!(keys(&log), vec!["2", "length"]);
        assert_eq!(log.borrow()[1].1, Value::from(2));
    }

    #[test]
    fn shift_notifies_every_moved_index() {
        let array = Array::from_values([1, 2, 3]);
        let log = watch_keys(&Value::from(array.clone()));
        assert_eq!(array.shift(), Value::from(1));
        assert_eq!(keys(&log), vec!["0", "1", "2", "length"]);
        assert_eq!(array.to_vec(), vec![Value::from(2), Value::from(3)]);
    }

    #[test]
    fn empty_pop_and_shift_are_silent() {
        let array = Array::new();
        let log = watch_keys(&Value::from(array.clone()));
        assert_eq!(array.pop(), Value::Undefined);
        assert_eq!(array.shift(), Value::Undefined);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let array = Array::from_values([1, 2, 3, 4]);
        let removed = array.splice(1, 10, [Value::from("x")]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3), Value::from(4)]);
        assert_eq!(array.to_vec(), vec![Value::from(1), Value::from("x")]);
        assert!(array.splice(9, 1, Vec::new()).is_empty());
    }

    #[test]
    fn sort_puts_undefined_last() {
        let array = Array::from_vec(vec![
            Value::from("b"),
            Value::Undefined,
            Value::from("a"),
        ]);
        array.sort();
        assert_eq!(
            array.to_vec(),
            vec![Value::from("a"), Value::from("b"), Value::Undefined]
        );
        array.sort_by(|a, b| b.to_display().cmp(&a.to_display()));
        assert_eq!(array.get(0), Value::from("b"));
    }

    #[test]
    fn reverse_of_palindrome_is_silent() {
        let array = Array::from_values([1, 2, 1]);
        let log = watch_keys(&Value::from(array.clone()));
        array.reverse();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn array_assign_length_and_index() {
        let array = Array::from_values([1, 2, 3]);
        let target = Value::from(array.clone());
        let log = watch_keys(&target);
        assign(&target, "length", 1);
        assert_eq!(keys(&log), vec!["1", "2", "length"]);
        log.borrow_mut().clear();

        assign(&target, "3", "d");
        assert_eq!(array.len(), 4);
        assert_eq!(keys(&log), vec!["3", "length"]);

        assign(&target, "x", 1);
        assign(&target, "length", -1);
        assert_eq!(array.len(), 4);
    }

    #[test]
    fn assign_path_resolves_parents() {
        let root = Value::from(Object::new().with("a", Object::new()));
        assert!(assign_path(&root, "a.b", 7));
        assert_eq!(root.get("a").get("b"), Value::from(7));
        assert!(!assign_path(&root, "missing.b", 7));
    }
}
