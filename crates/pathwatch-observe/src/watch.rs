#![forbid(unsafe_code)]

//! Key-path watches.
//!
//! A watch on `path` from a root fires `(new, old)` whenever the value found
//! by walking the path changes structurally, including when an intermediate
//! object along the path is replaced.
//!
//! Each path of `n` keys is a chain of `n + 1` levels. Level `i < n` observes
//! key `i` on the container found after walking `i` keys; level `n` observes
//! the final value itself with [`Key::Any`], so in-place changes to a watched
//! object or array are seen too. A level is either unbound (nothing to
//! observe there) or bound to one container. Any level firing re-walks the
//! chain, rebinding only the levels whose container changed, then compares
//! the new leaf against a deep snapshot of the last one.
//!
//! # Invariants
//!
//! 1. Level `i` is bound iff the value after `i` keys is a container, and then
//!    it is bound to exactly that container.
//! 2. Removing the last callback of a path unbinds every level and drops its
//!    interceptors.
//! 3. Installing a watch never fires it.
//! 4. The path registry holds the root weakly; paths of dropped roots are
//!    removed by [`purge_dead_paths`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use pathwatch_core::{ObjectId, Value, WeakValue, deep_clone, equals, resolve, to_key_path, to_keys};
use tracing::{debug, trace};

use crate::observer::{self, Callback, Key};

/// Identity-compared `(new, old)` watch callback.
#[derive(Clone)]
pub struct WatchCallback(Rc<dyn Fn(&Value, &Value)>);

impl WatchCallback {
    pub fn new(f: impl Fn(&Value, &Value) + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub fn call(&self, new: &Value, old: &Value) {
        (self.0)(new, old);
    }
}

impl fmt::Debug for WatchCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchCallback({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Unbound,
    Bound(ObjectId),
}

struct PathState {
    root: WeakValue,
    keys: Vec<String>,
    callbacks: Vec<WatchCallback>,
    links: Vec<Link>,
    last: Value,
}

/// Identifies one level of one watched path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InterceptorKey {
    root: ObjectId,
    prefix: String,
    suffix: String,
    depth: usize,
}

#[derive(Default)]
struct PathRegistry {
    roots: AHashMap<ObjectId, AHashMap<String, PathState>>,
    interceptors: AHashMap<InterceptorKey, Callback>,
}

impl PathRegistry {
    fn state(&self, root: ObjectId, path: &str) -> Option<&PathState> {
        self.roots.get(&root)?.get(path)
    }

    fn state_mut(&mut self, root: ObjectId, path: &str) -> Option<&mut PathState> {
        self.roots.get_mut(&root)?.get_mut(path)
    }

    /// The interceptor for one level, created on first use.
    fn interceptor(&mut self, root: ObjectId, path: &str, keys: &[String], depth: usize) -> Callback {
        let key = interceptor_key(root, keys, depth);
        self.interceptors
            .entry(key)
            .or_insert_with(|| {
                let path = path.to_string();
                Callback::new(move |_| on_level_changed(root, &path))
            })
            .clone()
    }
}

fn interceptor_key(root: ObjectId, keys: &[String], depth: usize) -> InterceptorKey {
    InterceptorKey {
        root,
        prefix: to_key_path(&keys[..depth]),
        suffix: to_key_path(&keys[depth..]),
        depth,
    }
}

thread_local! {
    static PATHS: RefCell<PathRegistry> = RefCell::new(PathRegistry::default());
}

fn level_key(keys: &[String], depth: usize) -> Key {
    keys.get(depth).map_or(Key::Any, |key| Key::Named(key.clone()))
}

fn root_id(target: &Value) -> Option<ObjectId> {
    target.is_object_like().then(|| target.object_id()).flatten()
}

/// Call `callback(new, old)` whenever the value at `path` under `target`
/// changes.
///
/// Non-container roots are ignored. Adding a callback that is already
/// registered for the path is a no-op.
pub fn watch(target: &Value, path: &str, callback: &WatchCallback) {
    let Some(weak) = target.downgrade() else {
        debug!(kind = target.type_name(), path, "watch on a non-container ignored");
        return;
    };
    let root = weak.id();
    let installed = PATHS.with(|paths| {
        let mut paths = paths.borrow_mut();
        let watched = paths.roots.entry(root).or_default();
        if let Some(state) = watched.get_mut(path) {
            if !state.callbacks.iter().any(|existing| existing.ptr_eq(callback)) {
                state.callbacks.push(callback.clone());
            }
            return false;
        }
        let keys = to_keys(path);
        let links = vec![Link::Unbound; keys.len() + 1];
        watched.insert(
            path.to_string(),
            PathState {
                root: weak,
                keys,
                callbacks: vec![callback.clone()],
                links,
                last: Value::Undefined,
            },
        );
        true
    });
    if !installed {
        return;
    }
    rebind(root, path);
    let initial = deep_clone(&resolve(target, &to_keys(path)));
    PATHS.with(|paths| {
        if let Some(state) = paths.borrow_mut().state_mut(root, path) {
            state.last = initial;
        }
    });
    debug!(root = %root, path, "path watch installed");
}

/// Remove `callback` from `path`; the last removal tears the path down.
pub fn unwatch(target: &Value, path: &str, callback: &WatchCallback) {
    let Some(root) = root_id(target) else {
        return;
    };
    let now_empty = PATHS.with(|paths| {
        let mut paths = paths.borrow_mut();
        let Some(state) = paths.state_mut(root, path) else {
            return false;
        };
        state.callbacks.retain(|existing| !existing.ptr_eq(callback));
        state.callbacks.is_empty()
    });
    if now_empty {
        teardown(root, path);
    }
}

/// Remove every callback on `path`.
pub fn unwatch_path(target: &Value, path: &str) {
    if let Some(root) = root_id(target) {
        teardown(root, path);
    }
}

/// Remove every path watched from `target`.
pub fn unwatch_all(target: &Value) {
    let Some(root) = root_id(target) else {
        return;
    };
    let watched: Vec<String> = PATHS.with(|paths| {
        paths
            .borrow()
            .roots
            .get(&root)
            .map(|watched| watched.keys().cloned().collect())
            .unwrap_or_default()
    });
    for path in watched {
        teardown(root, &path);
    }
}

fn teardown(root: ObjectId, path: &str) {
    let removed = PATHS.with(|paths| {
        let mut guard = paths.borrow_mut();
        let registry = &mut *guard;
        let watched = registry.roots.get_mut(&root)?;
        let state = watched.remove(path)?;
        if watched.is_empty() {
            registry.roots.remove(&root);
        }
        let interceptors: Vec<Option<Callback>> = (0..state.links.len())
            .map(|depth| {
                registry
                    .interceptors
                    .remove(&interceptor_key(root, &state.keys, depth))
            })
            .collect();
        Some((state, interceptors))
    });
    let Some((state, interceptors)) = removed else {
        return;
    };
    for (depth, (link, interceptor)) in state.links.iter().zip(&interceptors).enumerate() {
        if let (Link::Bound(id), Some(interceptor)) = (link, interceptor) {
            observer::unobserve_id(*id, &level_key(&state.keys, depth), interceptor);
        }
    }
    debug!(root = %root, path, "path watch removed");
}

fn on_level_changed(root: ObjectId, path: &str) {
    if rebind(root, path) {
        notify(root, path);
    }
}

/// Re-walk the chain and move the bindings that changed.
///
/// Returns `false` if the path is no longer watched or its root is gone.
fn rebind(root: ObjectId, path: &str) -> bool {
    let copied = PATHS.with(|paths| {
        let mut guard = paths.borrow_mut();
        let registry = &mut *guard;
        let state = registry.roots.get(&root)?.get(path)?;
        let (weak, keys, links) = (state.root.clone(), state.keys.clone(), state.links.clone());
        let interceptors: Vec<Callback> = (0..links.len())
            .map(|depth| registry.interceptor(root, path, &keys, depth))
            .collect();
        Some((weak, keys, links, interceptors))
    });
    let Some((weak, keys, links, interceptors)) = copied else {
        return false;
    };
    let Some(root_value) = weak.upgrade() else {
        teardown(root, path);
        return false;
    };

    // Getters may run during the walk, so no registry borrow is held here.
    let mut current = Some(root_value);
    let mut next_links = Vec::with_capacity(links.len());
    for (depth, link) in links.iter().enumerate() {
        let key = level_key(&keys, depth);
        let container = current.take().filter(Value::is_object_like);
        let wanted = container
            .as_ref()
            .and_then(Value::object_id)
            .map_or(Link::Unbound, Link::Bound);
        if *link != wanted {
            if let Link::Bound(old) = link {
                observer::unobserve_id(*old, &key, &interceptors[depth]);
            }
            if let Some(container) = &container {
                observer::observe(container, key.clone(), &interceptors[depth]);
            }
            trace!(root = %root, path, depth, "rebound level");
        }
        next_links.push(wanted);
        if let Some(name) = key.name() {
            current = container.map(|container| container.get(name));
        }
    }

    let orphaned = PATHS.with(|paths| match paths.borrow_mut().state_mut(root, path) {
        Some(state) => {
            state.links = next_links.clone();
            false
        }
        None => true,
    });
    if orphaned {
        // Torn down by a getter during the walk.
        for (depth, link) in next_links.iter().enumerate() {
            if let Link::Bound(id) = link {
                observer::unobserve_id(*id, &level_key(&keys, depth), &interceptors[depth]);
            }
        }
        return false;
    }
    true
}

/// Fire the path's callbacks if its value changed structurally.
fn notify(root: ObjectId, path: &str) {
    let copied = PATHS.with(|paths| {
        let paths = paths.borrow();
        let state = paths.state(root, path)?;
        Some((state.root.clone(), state.keys.clone(), state.last.clone()))
    });
    let Some((weak, keys, last)) = copied else {
        return;
    };
    let Some(root_value) = weak.upgrade() else {
        return;
    };
    let new = resolve(&root_value, &keys);
    if equals(&new, &last) {
        return;
    }
    let snapshot = deep_clone(&new);
    let callbacks = PATHS.with(|paths| {
        let mut paths = paths.borrow_mut();
        let state = paths.state_mut(root, path)?;
        state.last = snapshot;
        Some(state.callbacks.clone())
    });
    for callback in callbacks.unwrap_or_default() {
        callback.call(&new, &last);
    }
}

/// Tear down paths whose root has been dropped. Returns how many.
pub fn purge_dead_paths() -> usize {
    let dead: Vec<(ObjectId, String)> = PATHS.with(|paths| {
        paths
            .borrow()
            .roots
            .iter()
            .flat_map(|(root, watched)| {
                watched
                    .iter()
                    .filter(|(_, state)| !state.root.is_alive())
                    .map(|(path, _)| (*root, path.clone()))
            })
            .collect()
    });
    for (root, path) in &dead {
        teardown(*root, path);
    }
    dead.len()
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Number of roots with at least one watched path.
#[must_use]
pub fn watched_object_count() -> usize {
    PATHS.with(|paths| paths.borrow().roots.len())
}

/// Paths watched from `target`, sorted.
#[must_use]
pub fn watched_paths(target: &Value) -> Vec<String> {
    let Some(root) = root_id(target) else {
        return Vec::new();
    };
    let mut watched: Vec<String> = PATHS.with(|paths| {
        paths
            .borrow()
            .roots
            .get(&root)
            .map(|watched| watched.keys().cloned().collect())
            .unwrap_or_default()
    });
    watched.sort();
    watched
}

/// Number of callbacks on `path` from `target`.
#[must_use]
pub fn path_callback_count(target: &Value, path: &str) -> usize {
    root_id(target).map_or(0, |root| {
        PATHS.with(|paths| {
            paths
                .borrow()
                .state(root, path)
                .map_or(0, |state| state.callbacks.len())
        })
    })
}

/// Number of cached level interceptors.
#[must_use]
pub fn interceptor_count() -> usize {
    PATHS.with(|paths| paths.borrow().interceptors.len())
}
