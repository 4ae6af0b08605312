#![forbid(unsafe_code)]

//! Key-path string codec.
//!
//! A key path joins keys with `.`. A key containing a literal `.` or `^` is
//! escaped by prefixing that character with `^`:
//!
//! ```
//! use pathwatch_core::keypath::{to_key_path, to_keys};
//!
//! let keys = ["a.b", "c^", "d"];
//! let path = to_key_path(&keys);
//! assert_eq!(path, "a^.b.c^^.d");
//! assert_eq!(to_keys(&path), keys);
//! ```
//!
//! # Invariants
//!
//! 1. `to_keys(&to_key_path(k)) == k` for every non-empty key list `k`.
//! 2. The empty path decodes to a single empty key, mirroring `"a."` decoding
//!    to `["a", ""]`. The empty key list encodes to the empty path, so it is
//!    the one list that does not round-trip.
//! 3. A `^` followed by anything other than `.` or `^` is kept literally.

use std::borrow::Cow;

use crate::value::Value;

/// Key separator.
pub const SEPARATOR: char = '.';

/// Escape prefix.
pub const ESCAPE: char = '^';

/// Decode a key path into its keys.
#[must_use]
pub fn to_keys(path: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next @ (SEPARATOR | ESCAPE)) => current.push(next),
                Some(next) => {
                    current.push(ESCAPE);
                    current.push(next);
                }
                None => current.push(ESCAPE),
            },
            SEPARATOR => keys.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    keys.push(current);
    keys
}

/// Encode keys into a key path.
#[must_use]
pub fn to_key_path<S: AsRef<str>>(keys: &[S]) -> String {
    let mut path = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            path.push(SEPARATOR);
        }
        path.push_str(&escape_key(key.as_ref()));
    }
    path
}

/// Escape a single key for inclusion in a path.
#[must_use]
pub fn escape_key(key: &str) -> Cow<'_, str> {
    if !key.contains([SEPARATOR, ESCAPE]) {
        return Cow::Borrowed(key);
    }
    let mut escaped = String::with_capacity(key.len() + 2);
    for c in key.chars() {
        if c == SEPARATOR || c == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Append one key to an already-encoded path.
#[must_use]
pub fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        escape_key(key).into_owned()
    } else {
        format!("{path}{SEPARATOR}{}", escape_key(key))
    }
}

/// Walk `keys` from `root`, reading each level with [`Value::get`].
///
/// Stops at the first non-container and yields `Undefined` from there on.
#[must_use]
pub fn resolve<S: AsRef<str>>(root: &Value, keys: &[S]) -> Value {
    let mut current = root.clone();
    for key in keys {
        if current.is_nullish() {
            return Value::Undefined;
        }
        current = current.get(key.as_ref());
    }
    current
}

/// [`resolve`] over an encoded path.
#[must_use]
pub fn resolve_path(root: &Value, path: &str) -> Value {
    resolve(root, &to_keys(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_paths() {
        assert_eq!(to_keys("a.b.c"), ["a", "b", "c"]);
        assert_eq!(to_key_path(&["a", "b", "c"]), "a.b.c");
    }

    #[test]
    fn escapes_dot_and_caret() {
        assert_eq!(to_keys("a^.b"), ["a.b"]);
        assert_eq!(to_keys("a^^.b"), ["a^", "b"]);
        assert_eq!(to_key_path(&["x.y", "^"]), "x^.y.^^");
    }

    #[test]
    fn lone_caret_is_literal() {
        assert_eq!(to_keys("a^b"), ["a^b"]);
        assert_eq!(to_keys("a^"), ["a^"]);
    }

    #[test]
    fn empty_segments() {
        assert_eq!(to_keys(""), [""]);
        assert_eq!(to_keys("a."), ["a", ""]);
        assert_eq!(to_keys(".a"), ["", "a"]);
    }

    #[test]
    fn join_escapes_new_key() {
        assert_eq!(join("", "a.b"), "a^.b");
        assert_eq!(join("x", "y"), "x.y");
    }

    #[test]
    fn resolve_walks_nested_values() {
        use crate::value::Object;
        let root = Value::from(Object::new().with("a", Object::new().with("b.c", 3)));
        assert_eq!(resolve_path(&root, "a.b^.c"), Value::from(3));
        assert_eq!(resolve_path(&root, "a.missing.deeper"), Value::Undefined);
        assert_eq!(resolve(&Value::from("abc"), &["length"]), Value::from(3));
    }

    #[test]
    fn round_trip_tricky_keys() {
        let keys = ["^.", ".^", "^^", "..", "", "plain"];
        assert_eq!(to_keys(&to_key_path(&keys)), keys);
    }
}
