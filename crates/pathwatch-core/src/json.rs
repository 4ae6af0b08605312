#![forbid(unsafe_code)]

//! Conversion between [`Value`] graphs and `serde_json` documents.
//!
//! Conversion to JSON is lossy: `undefined`, functions, non-finite numbers and
//! back-references in cyclic graphs all become `null`.

use ahash::AHashSet;
use serde_json::{Map, Number};

use crate::value::{Array, Object, ObjectId, Value};

impl Value {
    /// Build a fresh value graph from a JSON document.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::from(s),
            serde_json::Value::Array(items) => {
                Self::Array(Array::from_vec(items.into_iter().map(Self::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.set_raw(key, Self::from_json(value));
                }
                Self::Object(object)
            }
        }
    }

    /// Render as a JSON document, evaluating computed fields.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut visiting = AHashSet::new();
        to_json_inner(self, &mut visiting)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json)
    }
}

fn to_json_inner(value: &Value, visiting: &mut AHashSet<ObjectId>) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Object(object) => {
            if !visiting.insert(object.id()) {
                return serde_json::Value::Null;
            }
            let mut map = Map::new();
            for key in object.keys() {
                let field = object.get(&key);
                map.insert(key, to_json_inner(&field, visiting));
            }
            visiting.remove(&object.id());
            serde_json::Value::Object(map)
        }
        Value::Array(array) => {
            if !visiting.insert(array.id()) {
                return serde_json::Value::Null;
            }
            let items = array
                .to_vec()
                .iter()
                .map(|item| to_json_inner(item, visiting))
                .collect();
            visiting.remove(&array.id());
            serde_json::Value::Array(items)
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n == n.trunc() && n.abs() < 9.0e15 {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}
