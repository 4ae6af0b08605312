#![forbid(unsafe_code)]

//! Compiled expressions and their live subscriptions.
//!
//! # Subscription modes
//!
//! | Expression                  | Mode      | Re-evaluated when                     |
//! |-----------------------------|-----------|---------------------------------------|
//! | static path set (no calls)  | paths     | any of its paths changes              |
//! | contains a call             | computed  | a dirty-check pass sees a new result  |
//!
//! In both modes the result is compared structurally with a deep copy of the
//! previous result, and callbacks receive `(new, old)` only on a real change.
//!
//! # Invariants
//!
//! 1. One subscription per `(expression, scope)`, shared by all its callbacks.
//! 2. Removing the last callback for a scope undoes every registration the
//!    subscription made.
//! 3. Dropping an [`Expression`] unwatches every scope it still watches.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use pathwatch_core::{Object, ObjectId, Value, WeakValue, deep_clone, equals};
use pathwatch_observe::{Callback, WatchCallback, observe, unobserve, unwatch, watch};
use tracing::debug;

use crate::ast::Node;
use crate::cache::{ExpressionCache, with_default_cache};
use crate::error::Result;
use crate::eval::evaluate;
use crate::filters::{FilterTable, default_filters};
use crate::parser::Parsed;

/// Field of the synthetic holder object used in computed mode.
const HOLDER_KEY: &str = "value";

enum Mode {
    Paths {
        paths: Vec<String>,
        interceptor: WatchCallback,
    },
    Computed {
        holder: Value,
        observer: Callback,
    },
}

struct Subscription {
    scope: WeakValue,
    parsed: Rc<Parsed>,
    filters: Rc<FilterTable>,
    mode: Mode,
    callbacks: RefCell<Vec<WatchCallback>>,
    value: RefCell<Value>,
}

impl Subscription {
    fn install(scope: &Value, parsed: &Rc<Parsed>, filters: &Rc<FilterTable>) -> Option<Rc<Self>> {
        let weak_scope = scope.downgrade()?;
        let subscription = Rc::new_cyclic(|me: &Weak<Self>| {
            let me = me.clone();
            let on_change = move || {
                if let Some(subscription) = me.upgrade() {
                    subscription.reevaluate();
                }
            };
            let mode = match parsed.paths() {
                Some(paths) => Mode::Paths {
                    paths: paths.to_vec(),
                    interceptor: WatchCallback::new(move |_, _| on_change()),
                },
                None => {
                    let scope = weak_scope.clone();
                    let parsed = Rc::clone(parsed);
                    let filters = Rc::clone(filters);
                    let holder = Object::new().with_getter(HOLDER_KEY, move |_| {
                        scope
                            .upgrade()
                            .map_or(Value::Undefined, |scope| evaluate(parsed.ast(), &scope, &filters))
                    });
                    Mode::Computed {
                        holder: Value::Object(holder),
                        observer: Callback::new(move |_| on_change()),
                    }
                }
            };
            Self {
                scope: weak_scope,
                parsed: Rc::clone(parsed),
                filters: Rc::clone(filters),
                mode,
                callbacks: RefCell::new(Vec::new()),
                value: RefCell::new(Value::Undefined),
            }
        });
        let initial = deep_clone(&evaluate(subscription.parsed.ast(), scope, &subscription.filters));
        *subscription.value.borrow_mut() = initial;
        subscription.attach(scope);
        Some(subscription)
    }

    fn attach(&self, scope: &Value) {
        match &self.mode {
            Mode::Paths { paths, interceptor } => {
                for path in paths {
                    watch(scope, path, interceptor);
                }
            }
            Mode::Computed { holder, observer } => observe(holder, HOLDER_KEY, observer),
        }
    }

    fn detach(&self) {
        match &self.mode {
            Mode::Paths { paths, interceptor } => {
                // A dropped scope's paths are purged by the next check pass.
                if let Some(scope) = self.scope.upgrade() {
                    for path in paths {
                        unwatch(&scope, path, interceptor);
                    }
                }
            }
            Mode::Computed { holder, observer } => unobserve(holder, HOLDER_KEY, observer),
        }
    }

    fn reevaluate(&self) {
        let Some(scope) = self.scope.upgrade() else {
            return;
        };
        let new = evaluate(self.parsed.ast(), &scope, &self.filters);
        let old = self.value.borrow().clone();
        if equals(&new, &old) {
            return;
        }
        *self.value.borrow_mut() = deep_clone(&new);
        let callbacks = self.callbacks.borrow().clone();
        for callback in &callbacks {
            callback.call(&new, &old);
        }
    }
}

/// A parsed expression bound to a filter table.
///
/// ```
/// use pathwatch_core::{Object, Value};
/// use pathwatch_expr::Expression;
///
/// let scope = Value::from(Object::new().with("x", Object::new().with("y", 2)));
/// let expr = Expression::new("x.y * 10 + 1").unwrap();
/// assert_eq!(expr.compile(&scope), Value::from(21));
/// assert_eq!(expr.paths(), Some(&["x.y".to_string()][..]));
/// ```
pub struct Expression {
    parsed: Rc<Parsed>,
    filters: Rc<FilterTable>,
    subscriptions: RefCell<AHashMap<ObjectId, Rc<Subscription>>>,
}

impl Expression {
    /// Parse through this thread's default cache, with the built-in filters.
    pub fn new(source: &str) -> Result<Self> {
        with_default_cache(|cache| Self::with_cache(source, cache))
    }

    /// Parse through an explicit cache, with the built-in filters.
    pub fn with_cache(source: &str, cache: &ExpressionCache) -> Result<Self> {
        Ok(Self::from_parsed(cache.parse(source)?))
    }

    #[must_use]
    pub fn from_parsed(parsed: Rc<Parsed>) -> Self {
        Self {
            parsed,
            filters: default_filters(),
            subscriptions: RefCell::new(AHashMap::new()),
        }
    }

    /// Use `filters` instead of the built-in table.
    #[must_use]
    pub fn with_filters(mut self, filters: Rc<FilterTable>) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.parsed.source()
    }

    #[must_use]
    pub fn ast(&self) -> &Node {
        self.parsed.ast()
    }

    #[must_use]
    pub fn parsed(&self) -> &Rc<Parsed> {
        &self.parsed
    }

    /// Static key paths, or `None` for computed expressions.
    #[must_use]
    pub fn paths(&self) -> Option<&[String]> {
        self.parsed.paths()
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.parsed.is_computed()
    }

    /// Evaluate against `scope`.
    #[must_use]
    pub fn compile(&self, scope: &Value) -> Value {
        evaluate(self.parsed.ast(), scope, &self.filters)
    }

    /// Call `callback(new, old)` whenever the result against `scope` changes.
    ///
    /// Non-container scopes are ignored. Adding a callback twice is a no-op.
    pub fn watch(&self, scope: &Value, callback: &WatchCallback) {
        let Some(id) = scope.is_object_like().then(|| scope.object_id()).flatten() else {
            debug!(source = self.source(), "expression watch on a non-container ignored");
            return;
        };
        let existing = self.subscriptions.borrow().get(&id).cloned();
        let subscription = match existing {
            Some(subscription) => subscription,
            None => {
                let Some(subscription) = Subscription::install(scope, &self.parsed, &self.filters)
                else {
                    return;
                };
                self.subscriptions
                    .borrow_mut()
                    .insert(id, Rc::clone(&subscription));
                debug!(
                    source = self.source(),
                    computed = self.is_computed(),
                    "expression subscription installed"
                );
                subscription
            }
        };
        let mut callbacks = subscription.callbacks.borrow_mut();
        if !callbacks.iter().any(|existing| existing.ptr_eq(callback)) {
            callbacks.push(callback.clone());
        }
    }

    /// Remove `callback`; the last removal for a scope undoes the subscription.
    pub fn unwatch(&self, scope: &Value, callback: &WatchCallback) {
        let Some(id) = scope.object_id() else {
            return;
        };
        let empty = self.subscriptions.borrow().get(&id).is_some_and(|subscription| {
            let mut callbacks = subscription.callbacks.borrow_mut();
            callbacks.retain(|existing| !existing.ptr_eq(callback));
            callbacks.is_empty()
        });
        if empty {
            self.remove_subscription(id);
        }
    }

    /// Remove every callback watching `scope`.
    pub fn unwatch_scope(&self, scope: &Value) {
        if let Some(id) = scope.object_id() {
            self.remove_subscription(id);
        }
    }

    /// Number of scopes currently watched.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    fn remove_subscription(&self, id: ObjectId) {
        let removed = self.subscriptions.borrow_mut().remove(&id);
        if let Some(subscription) = removed {
            subscription.detach();
            debug!(source = self.source(), "expression subscription removed");
        }
    }
}

impl Drop for Expression {
    fn drop(&mut self) {
        let subscriptions: Vec<Rc<Subscription>> = self
            .subscriptions
            .get_mut()
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();
        for subscription in subscriptions {
            subscription.detach();
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source())
            .field("paths", &self.paths())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
