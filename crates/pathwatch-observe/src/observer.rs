#![forbid(unsafe_code)]

//! Per-object, per-key callback registries.
//!
//! The registries are thread-local and keyed by [`ObjectId`]; they hold only
//! weak handles to the observed containers, so observing an object never
//! extends its lifetime. Entries for containers that have been dropped are
//! removed by [`purge_dead_entries`], which every dirty-check pass runs.
//!
//! # Invariants
//!
//! 1. An object with no remaining callbacks has no entry (no empty maps).
//! 2. A key has a computed snapshot iff it has ≥1 callback and is defined as
//!    a computed field on its object.
//! 3. Callbacks for one `(object, key)` fire in registration order, followed
//!    by the object's [`Key::Any`] callbacks.
//! 4. Callbacks run against a snapshot of the registered set; no registry
//!    borrow is held while they run, so they may observe or unobserve freely.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use pathwatch_core::{Object, ObjectId, Value, WeakObject, WeakValue, same};
use tracing::trace;

use crate::scheduler;

/// Which property a callback is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Any change to the object, whatever the key.
    Any,
    /// One named property (array indices are decimal strings).
    Named(String),
}

impl Key {
    /// The property name, or `None` for [`Key::Any`].
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Named(index.to_string())
    }
}

/// A change delivered to key callbacks.
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    /// The object or array that changed.
    pub target: &'a Value,
    /// The key that changed.
    pub key: &'a str,
    /// The value before the change.
    pub old: &'a Value,
}

impl Change<'_> {
    /// Current value at the changed key.
    #[must_use]
    pub fn value(&self) -> Value {
        self.target.get(self.key)
    }
}

/// Identity-compared key callback.
///
/// Cloning shares the identity; two separately created callbacks are never
/// equal, even when built from the same closure.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&Change<'_>)>);

impl Callback {
    pub fn new(f: impl Fn(&Change<'_>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Whether both handles are the same callback.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub fn call(&self, change: &Change<'_>) {
        (self.0)(change);
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

struct ObservedEntry {
    target: WeakValue,
    keys: AHashMap<Key, Vec<Callback>>,
}

struct ComputedEntry {
    target: WeakObject,
    snapshots: AHashMap<String, Value>,
}

#[derive(Default)]
struct Registry {
    observed: AHashMap<ObjectId, ObservedEntry>,
    computed: AHashMap<ObjectId, ComputedEntry>,
}

impl Registry {
    fn has_callbacks(&self, id: ObjectId, key: &str) -> bool {
        self.observed.get(&id).is_some_and(|entry| {
            entry
                .keys
                .get(&Key::Named(key.to_string()))
                .is_some_and(|list| !list.is_empty())
        })
    }

    fn is_tracked(&self, id: ObjectId, key: &str) -> bool {
        self.computed
            .get(&id)
            .is_some_and(|entry| entry.snapshots.contains_key(key))
    }

    fn untrack(&mut self, id: ObjectId, key: &str) {
        if let Some(entry) = self.computed.get_mut(&id) {
            entry.snapshots.remove(key);
            if entry.snapshots.is_empty() {
                self.computed.remove(&id);
            }
        }
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

fn observable_id(target: &Value) -> Option<ObjectId> {
    target.is_object_like().then(|| target.object_id()).flatten()
}

/// Register `callback` for `key` on `target`.
///
/// Non-container targets are ignored. Registering the same callback twice for
/// the same key is a no-op. Observing a computed field starts dirty checking
/// it.
pub fn observe(target: &Value, key: impl Into<Key>, callback: &Callback) {
    let Some(weak) = target.downgrade() else {
        return;
    };
    let id = weak.id();
    let key = key.into();
    let (inserted, created) = REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let mut created = false;
        let entry = registry.observed.entry(id).or_insert_with(|| {
            created = true;
            ObservedEntry {
                target: weak,
                keys: AHashMap::new(),
            }
        });
        let list = entry.keys.entry(key.clone()).or_default();
        if list.iter().any(|existing| existing.ptr_eq(callback)) {
            (false, created)
        } else {
            list.push(callback.clone());
            (true, created)
        }
    });
    if created {
        scheduler::schedule_sweep();
    }
    if inserted {
        trace!(target = %id, %key, "observe");
        if let Key::Named(name) = &key {
            sync_computed(target, name);
        }
    }
}

/// Remove `callback` from `key` on `target`. Unknown callbacks are ignored.
pub fn unobserve(target: &Value, key: impl Into<Key>, callback: &Callback) {
    if let Some(id) = observable_id(target) {
        unobserve_id(id, &key.into(), callback);
    }
}

/// Identity-based removal, usable after the target has been dropped.
pub(crate) fn unobserve_id(id: ObjectId, key: &Key, callback: &Callback) {
    REGISTRY.with(|registry| {
        let mut guard = registry.borrow_mut();
        let registry = &mut *guard;
        let Some(entry) = registry.observed.get_mut(&id) else {
            return;
        };
        let Some(list) = entry.keys.get_mut(key) else {
            return;
        };
        list.retain(|existing| !existing.ptr_eq(callback));
        let key_emptied = list.is_empty();
        if key_emptied {
            entry.keys.remove(key);
        }
        let entry_emptied = entry.keys.is_empty();
        if entry_emptied {
            registry.observed.remove(&id);
        }
        if let (true, Key::Named(name)) = (key_emptied, key) {
            registry.untrack(id, name);
        }
        trace!(target = %id, %key, "unobserve");
    });
}

/// Notify observers that `key` on `target` changed from `old`.
///
/// No-op when nothing observes the key, or when the current value is the
/// same (by reference) as `old`.
pub fn execute_callbacks(target: &Value, key: &str, old: &Value) {
    let Some(id) = observable_id(target) else {
        return;
    };
    let callbacks = REGISTRY.with(|registry| {
        let registry = registry.borrow();
        let Some(entry) = registry.observed.get(&id) else {
            return Vec::new();
        };
        let mut callbacks = entry
            .keys
            .get(&Key::Named(key.to_string()))
            .cloned()
            .unwrap_or_default();
        if let Some(any) = entry.keys.get(&Key::Any) {
            callbacks.extend(any.iter().cloned());
        }
        callbacks
    });
    if callbacks.is_empty() {
        return;
    }
    let current = target.get(key);
    if same(&current, old) {
        return;
    }
    let change = Change { target, key, old };
    for callback in &callbacks {
        callback.call(&change);
    }
}

/// Bring the computed snapshot for `key` in line with invariant 2.
pub(crate) fn sync_computed(target: &Value, key: &str) {
    let Value::Object(object) = target else {
        return;
    };
    let id = object.id();
    let wanted = object.is_computed(key)
        && REGISTRY.with(|registry| registry.borrow().has_callbacks(id, key));
    let tracked = REGISTRY.with(|registry| registry.borrow().is_tracked(id, key));
    match (wanted, tracked) {
        (true, false) => {
            // The getter runs before the registry is borrowed.
            let snapshot = object.get(key);
            REGISTRY.with(|registry| {
                registry
                    .borrow_mut()
                    .computed
                    .entry(id)
                    .or_insert_with(|| ComputedEntry {
                        target: object.downgrade(),
                        snapshots: AHashMap::new(),
                    })
                    .snapshots
                    .insert(key.to_string(), snapshot);
            });
            trace!(target = %id, key, "tracking computed key");
            scheduler::schedule_check();
        }
        (false, true) => {
            REGISTRY.with(|registry| registry.borrow_mut().untrack(id, key));
        }
        _ => {}
    }
}

/// Replace the snapshot of a tracked computed key with its current value.
pub(crate) fn refresh_snapshot(object: &Object, key: &str) {
    let id = object.id();
    if !REGISTRY.with(|registry| registry.borrow().is_tracked(id, key)) {
        return;
    }
    let current = object.get(key);
    update_snapshot(id, key, current);
}

/// Store a new snapshot; returns `false` when the key is no longer tracked.
pub(crate) fn update_snapshot(id: ObjectId, key: &str, value: Value) -> bool {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        match registry
            .computed
            .get_mut(&id)
            .and_then(|entry| entry.snapshots.get_mut(key))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    })
}

/// Live tracked objects with a copy of their snapshots.
pub(crate) fn computed_entries() -> Vec<(Object, Vec<(String, Value)>)> {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .computed
            .values()
            .filter_map(|entry| {
                let object = entry.target.upgrade()?;
                let snapshots = entry
                    .snapshots
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Some((object, snapshots))
            })
            .collect()
    })
}

/// Drop registry entries whose object is no longer alive.
///
/// Returns the number of entries removed across both registries.
pub fn purge_dead_entries() -> usize {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let before = registry.observed.len() + registry.computed.len();
        registry.observed.retain(|_, entry| entry.target.is_alive());
        registry
            .computed
            .retain(|_, entry| entry.target.upgrade().is_some());
        before - registry.observed.len() - registry.computed.len()
    })
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Number of objects with at least one key callback.
#[must_use]
pub fn observed_object_count() -> usize {
    REGISTRY.with(|registry| registry.borrow().observed.len())
}

/// Number of objects with at least one tracked computed key.
#[must_use]
pub fn computed_object_count() -> usize {
    REGISTRY.with(|registry| registry.borrow().computed.len())
}

/// Whether any computed key is tracked on this thread.
#[must_use]
pub fn has_tracked_computed() -> bool {
    REGISTRY.with(|registry| !registry.borrow().computed.is_empty())
}

/// Whether `target` has any key callback.
#[must_use]
pub fn is_observed(target: &Value) -> bool {
    observable_id(target)
        .is_some_and(|id| REGISTRY.with(|registry| registry.borrow().observed.contains_key(&id)))
}

/// Number of callbacks registered for `key` on `target`.
#[must_use]
pub fn observer_count(target: &Value, key: impl Into<Key>) -> usize {
    let Some(id) = observable_id(target) else {
        return 0;
    };
    let key = key.into();
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .observed
            .get(&id)
            .and_then(|entry| entry.keys.get(&key))
            .map_or(0, Vec::len)
    })
}

/// Computed keys currently dirty-checked on `target`, sorted.
#[must_use]
pub fn tracked_computed_keys(target: &Value) -> Vec<String> {
    let Some(id) = observable_id(target) else {
        return Vec::new();
    };
    let mut keys: Vec<String> = REGISTRY.with(|registry| {
        registry
            .borrow()
            .computed
            .get(&id)
            .map(|entry| entry.snapshots.keys().cloned().collect())
            .unwrap_or_default()
    });
    keys.sort();
    keys
}
