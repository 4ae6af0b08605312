#![forbid(unsafe_code)]

//! Scoped watch lifetimes.
//!
//! Every registration made through the lower layers lives until it is
//! explicitly removed. A [`WatchGuard`] ties one registration to a Rust value
//! instead: dropping the guard removes it. A [`WatchScope`] owns many guards
//! and releases them together, the usual shape for a view that binds several
//! paths and expressions and tears them all down when it goes away.
//!
//! Guards hold their target weakly, so a guard never keeps an object graph
//! alive. Releasing a guard whose target is already gone is a no-op; the
//! registry entries of dead targets are purged by the next sweep.
//!
//! # Invariants
//!
//! 1. A guard removes exactly the callback it registered, never another
//!    registration on the same target.
//! 2. Dropping a [`WatchScope`] releases its guards in registration order.
//! 3. [`WatchGuard::release`] is idempotent.

use std::fmt;
use std::rc::Rc;

use pathwatch_core::{Value, WeakValue};
use pathwatch_expr::Expression;
use pathwatch_observe::{Callback, Change, Key, WatchCallback, observe, unobserve, unwatch, watch};
use tracing::trace;

// ---------------------------------------------------------------------------
// WatchGuard — one registration
// ---------------------------------------------------------------------------

enum Registration {
    Observer {
        key: Key,
        callback: Callback,
    },
    Path {
        path: String,
        callback: WatchCallback,
    },
    Expression {
        expression: Rc<Expression>,
        callback: WatchCallback,
    },
}

/// Removes one observer, path watch or expression watch when dropped.
#[must_use = "dropping a WatchGuard removes its watch immediately"]
pub struct WatchGuard {
    target: Option<WeakValue>,
    registration: Option<Registration>,
}

impl WatchGuard {
    /// Observe `key` on `target` until the guard is dropped.
    pub fn observe(target: &Value, key: impl Into<Key>, callback: Callback) -> Self {
        let key = key.into();
        observe(target, key.clone(), &callback);
        Self::new(target, Registration::Observer { key, callback })
    }

    /// Watch the key path `path` from `target` until the guard is dropped.
    pub fn watch(target: &Value, path: &str, callback: WatchCallback) -> Self {
        watch(target, path, &callback);
        Self::new(
            target,
            Registration::Path {
                path: path.to_string(),
                callback,
            },
        )
    }

    /// Watch `expression` against `scope` until the guard is dropped.
    pub fn watch_expression(
        expression: Rc<Expression>,
        scope: &Value,
        callback: WatchCallback,
    ) -> Self {
        expression.watch(scope, &callback);
        Self::new(
            scope,
            Registration::Expression {
                expression,
                callback,
            },
        )
    }

    fn new(target: &Value, registration: Registration) -> Self {
        Self {
            target: target.downgrade(),
            registration: Some(registration),
        }
    }

    /// Whether the registration is still in place.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registration.is_some() && self.target.as_ref().is_some_and(WeakValue::is_alive)
    }

    /// Remove the registration now instead of at drop.
    pub fn release(&mut self) {
        let Some(registration) = self.registration.take() else {
            return;
        };
        let Some(target) = self.target.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        match registration {
            Registration::Observer { key, callback } => {
                trace!(%key, "guard released observer");
                unobserve(&target, key, &callback);
            }
            Registration::Path { path, callback } => {
                trace!(path = path.as_str(), "guard released path watch");
                unwatch(&target, &path, &callback);
            }
            Registration::Expression {
                expression,
                callback,
            } => {
                trace!(source = expression.source(), "guard released expression watch");
                expression.unwatch(&target, &callback);
            }
        }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.registration {
            Some(Registration::Observer { key, .. }) => format!("observe {key}"),
            Some(Registration::Path { path, .. }) => format!("watch {path:?}"),
            Some(Registration::Expression { expression, .. }) => {
                format!("expression {:?}", expression.source())
            }
            None => "released".to_string(),
        };
        f.debug_struct("WatchGuard")
            .field("registration", &kind)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WatchScope — lifecycle management
// ---------------------------------------------------------------------------

/// Collects [`WatchGuard`]s and releases them together.
///
/// Dropping the scope releases everything it holds.
///
/// ```
/// use pathwatch::prelude::*;
///
/// let root = Value::from(Object::new().with("a", 1).with("b", 2));
/// let mut scope = WatchScope::new();
/// scope
///     .watch(&root, "a", |_, _| {})
///     .watch(&root, "b", |_, _| {});
/// assert_eq!(scope.binding_count(), 2);
///
/// scope.clear();
/// assert!(scope.is_empty());
/// assert!(pathwatch::pathwatch_observe::watched_paths(&root).is_empty());
/// ```
#[derive(Default)]
pub struct WatchScope {
    guards: Vec<WatchGuard>,
}

impl WatchScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an existing guard.
    pub fn hold(&mut self, guard: WatchGuard) {
        self.guards.push(guard);
    }

    /// Observe `key` on `target` for the lifetime of this scope.
    pub fn observe(
        &mut self,
        target: &Value,
        key: impl Into<Key>,
        callback: impl Fn(&Change<'_>) + 'static,
    ) -> &mut Self {
        self.hold(WatchGuard::observe(target, key, Callback::new(callback)));
        self
    }

    /// Watch a key path for the lifetime of this scope.
    pub fn watch(
        &mut self,
        target: &Value,
        path: &str,
        callback: impl Fn(&Value, &Value) + 'static,
    ) -> &mut Self {
        self.hold(WatchGuard::watch(target, path, WatchCallback::new(callback)));
        self
    }

    /// Watch an expression against `scope` for the lifetime of this scope.
    pub fn watch_expression(
        &mut self,
        expression: &Rc<Expression>,
        scope: &Value,
        callback: impl Fn(&Value, &Value) + 'static,
    ) -> &mut Self {
        self.hold(WatchGuard::watch_expression(
            Rc::clone(expression),
            scope,
            WatchCallback::new(callback),
        ));
        self
    }

    /// Number of guards held.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.guards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release every guard, in registration order.
    pub fn clear(&mut self) {
        for mut guard in self.guards.drain(..) {
            guard.release();
        }
    }
}

impl Drop for WatchScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchScope")
            .field("binding_count", &self.guards.len())
            .finish()
    }
}
