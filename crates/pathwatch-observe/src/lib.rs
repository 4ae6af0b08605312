#![forbid(unsafe_code)]

//! Change observation over [`pathwatch_core`] values.
//!
//! Two layers share one thread-local registry:
//!
//! - **Key observation** ([`observer`], [`mutation`], [`scheduler`]):
//!   callbacks per `(object, key)`, fed by the mediated mutation API for
//!   stored fields and by dirty checking for computed fields. Change
//!   detection is by reference ([`pathwatch_core::same`]).
//! - **Key-path watches** ([`watch`]): `(new, old)` callbacks on a dotted
//!   path that survive replacement of intermediate objects. Change detection
//!   is structural ([`pathwatch_core::equals()`]).
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use pathwatch_core::{Object, Value};
//! use pathwatch_observe::{WatchCallback, assign, watch};
//!
//! let child = Object::new().with("x", 1);
//! let root = Value::from(Object::new().with("child", child));
//!
//! let fired = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&fired);
//! let callback = WatchCallback::new(move |_new, _old| counter.set(counter.get() + 1));
//! watch(&root, "child.x", &callback);
//!
//! assign(&root, "child", Object::new().with("x", 2));
//! assert_eq!(fired.get(), 1);
//! ```

pub mod config;
pub mod mutation;
pub mod observer;
pub mod scheduler;
pub mod watch;

pub use config::{DEFAULT_MAX_CHECK_CYCLES, MAX_CHECK_CYCLES_ENV, SchedulerConfig};
pub use mutation::{ArrayMutations, assign, assign_path, define, refresh, remove};
pub use observer::{
    Callback, Change, Key, computed_object_count, execute_callbacks, has_tracked_computed,
    is_observed, observe, observed_object_count, observer_count, purge_dead_entries,
    tracked_computed_keys, unobserve,
};
pub use scheduler::{
    check_aborts_total, check_passes_total, is_check_pending, schedule_check, schedule_sweep,
    scheduler_config, set_scheduler_config,
};
pub use watch::{
    WatchCallback, interceptor_count, path_callback_count, purge_dead_paths, unwatch,
    unwatch_all, unwatch_path, watch, watched_object_count, watched_paths,
};
