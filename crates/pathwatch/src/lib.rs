#![forbid(unsafe_code)]

//! Reactivity over dynamic object graphs.
//!
//! `pathwatch` re-exports its three layers and adds scoped lifetimes:
//!
//! | Crate | Provides |
//! |-------|----------|
//! | [`pathwatch_core`] | values, comparison, cloning, the key-path codec, the microtask queue |
//! | [`pathwatch_observe`] | key observation, mediated mutation, dirty checking, key-path watches |
//! | [`pathwatch_expr`] | binding expressions: parsing, caching, filters, live subscriptions |
//!
//! [`WatchScope`] collects [`WatchGuard`]s so a group of watches can be torn
//! down together, either explicitly or by dropping the scope.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use pathwatch::prelude::*;
//!
//! let root = Value::from(Object::new().with("user", Object::new().with("name", "ada")));
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//!
//! let mut scope = WatchScope::new();
//! scope.watch(&root, "user.name", move |new, _old| {
//!     sink.borrow_mut().push(new.to_display());
//! });
//!
//! assign(&root, "user", Object::new().with("name", "grace"));
//! assert_eq!(*seen.borrow(), vec!["grace".to_string()]);
//!
//! drop(scope);
//! assign(&root, "user", Object::new().with("name", "linus"));
//! assert_eq!(seen.borrow().len(), 1);
//! ```

pub mod scope;

pub use pathwatch_core;
pub use pathwatch_expr;
pub use pathwatch_observe;

pub use scope::{WatchGuard, WatchScope};

/// The items most callers need.
pub mod prelude {
    pub use crate::scope::{WatchGuard, WatchScope};
    pub use pathwatch_core::{
        Array, Field, Function, Object, Value, deep_clone, equals, run_microtasks, same,
    };
    pub use pathwatch_expr::{ExprError, Expression, FilterTable};
    pub use pathwatch_observe::{
        ArrayMutations, Callback, Change, Key, WatchCallback, assign, assign_path, define,
        observe, refresh, remove, unobserve, unwatch, watch,
    };
}
