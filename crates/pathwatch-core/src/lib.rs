#![forbid(unsafe_code)]

//! Shared foundations for pathwatch.
//!
//! - [`value`]: the dynamic value model ([`Value`], [`Object`], [`Array`],
//!   [`Function`]) with identity-bearing handles.
//! - [`equals`]: strict ([`same`]) and structural ([`equals()`]) comparison.
//! - [`clone`]: [`shallow_clone`] and cycle-safe [`deep_clone`].
//! - [`keypath`]: the escaped dotted key-path codec.
//! - [`asap`]: the thread-local microtask queue that batches deferred work.
//! - JSON conversion via [`Value::from_json`] / [`Value::to_json`].

pub mod asap;
pub mod clone;
pub mod equals;
mod json;
pub mod keypath;
pub mod value;

pub use asap::{asap, has_pending_microtasks, pending_microtasks, run_microtasks};
pub use clone::{deep_clone, shallow_clone};
pub use equals::{equals, same};
pub use keypath::{resolve, resolve_path, to_key_path, to_keys};
pub use value::{
    Array, Field, Function, Getter, NativeFn, Object, ObjectId, Value, WeakArray, WeakObject,
    WeakValue, MAX_ARRAY_LENGTH, array_index, format_number,
};
