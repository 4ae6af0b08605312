#![forbid(unsafe_code)]

//! Named value filters applied with `value | name:arg, ...`.
//!
//! Every filter is a pure `(input, args) → value` function. Filters never
//! fail: input they cannot handle is returned unchanged.
//!
//! | Filter       | Arguments                 | Result                                   |
//! |--------------|---------------------------|------------------------------------------|
//! | `date`       | format = `%B %-d, %Y`     | formatted date, from `m/d/yy`, `m/d/yyyy`, `yyyy-mm-dd`, RFC 3339 or epoch ms |
//! | `upper`      | –                         | upper-cased display string               |
//! | `lower`      | –                         | lower-cased display string               |
//! | `capitalize` | –                         | first character upper-cased              |
//! | `trim`       | –                         | display string without outer whitespace  |
//! | `json`       | pretty = false            | JSON text                                |
//! | `number`     | decimals = 0              | fixed-point text                         |
//! | `default`    | fallback                  | fallback for undefined, null or `""`     |
//! | `length`     | –                         | length of a string, array or object      |
//! | `join`       | separator = `,`           | joined display strings of an array       |

use std::fmt::{self, Write as _};
use std::rc::Rc;

use ahash::AHashMap;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use pathwatch_core::Value;
use tracing::warn;

/// Default output format of the `date` filter.
pub const DEFAULT_DATE_FORMAT: &str = "%B %-d, %Y";

const DATE_INPUT_FORMATS: [&str; 3] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

const MAX_DECIMALS: usize = 20;

pub type FilterFn = Rc<dyn Fn(&Value, &[Value]) -> Value>;

/// Name → filter lookup used by the evaluator.
#[derive(Clone, Default)]
pub struct FilterTable {
    filters: AHashMap<String, FilterFn>,
}

impl FilterTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in filters.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .with("date", date)
            .with("upper", |value, _| Value::from(value.to_display().to_uppercase()))
            .with("lower", |value, _| Value::from(value.to_display().to_lowercase()))
            .with("capitalize", capitalize)
            .with("trim", |value, _| Value::from(value.to_display().trim()))
            .with("json", json)
            .with("number", number)
            .with("default", default)
            .with("length", length)
            .with("join", join)
    }

    /// Add or replace a filter.
    #[must_use]
    pub fn with(
        mut self,
        name: impl Into<String>,
        filter: impl Fn(&Value, &[Value]) -> Value + 'static,
    ) -> Self {
        self.insert(name, filter);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        filter: impl Fn(&Value, &[Value]) -> Value + 'static,
    ) {
        self.filters.insert(name.into(), Rc::new(filter));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Apply `name`; unknown filters log a warning and pass `input` through.
    #[must_use]
    pub fn apply(&self, name: &str, input: &Value, args: &[Value]) -> Value {
        match self.filters.get(name) {
            Some(filter) => filter(input, args),
            None => {
                warn!(filter = name, "unknown filter; passing value through");
                input.clone()
            }
        }
    }
}

impl fmt::Debug for FilterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterTable")
            .field("filters", &self.names())
            .finish()
    }
}

thread_local! {
    static DEFAULT_FILTERS: Rc<FilterTable> = Rc::new(FilterTable::with_defaults());
}

/// This thread's shared built-in table.
#[must_use]
pub fn default_filters() -> Rc<FilterTable> {
    DEFAULT_FILTERS.with(Rc::clone)
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(ms) if ms.is_finite() => {
            #[allow(clippy::cast_possible_truncation)]
            let ms = ms.trunc() as i64;
            DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
        }
        Value::String(text) => {
            let text = text.trim();
            DATE_INPUT_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .or_else(|| {
                    DateTime::parse_from_rfc3339(text)
                        .ok()
                        .map(|dt| dt.naive_local())
                })
        }
        _ => None,
    }
}

fn date(value: &Value, args: &[Value]) -> Value {
    let Some(parsed) = parse_date(value) else {
        return value.clone();
    };
    let format = args
        .first()
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_DATE_FORMAT);
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.contains(&Item::Error) {
        warn!(format, "invalid date format");
        return value.clone();
    }
    let mut out = String::new();
    match write!(out, "{}", parsed.format_with_items(items.iter())) {
        Ok(()) => Value::from(out),
        Err(_) => {
            warn!(format, "date format not applicable");
            value.clone()
        }
    }
}

fn capitalize(value: &Value, _args: &[Value]) -> Value {
    let text = value.to_display();
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => Value::from(first.to_uppercase().chain(chars).collect::<String>()),
        None => Value::from(text),
    }
}

fn json(value: &Value, args: &[Value]) -> Value {
    let doc = value.to_json();
    let pretty = args.first().is_some_and(Value::is_truthy);
    let text = if pretty {
        serde_json::to_string_pretty(&doc)
    } else {
        serde_json::to_string(&doc)
    };
    text.map_or_else(|_| value.clone(), Value::from)
}

fn number(value: &Value, args: &[Value]) -> Value {
    let n = value.to_number();
    if !n.is_finite() {
        return value.clone();
    }
    let decimals = args
        .first()
        .map(Value::to_number)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map_or(0, |d| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let d = d as usize;
            d.min(MAX_DECIMALS)
        });
    Value::from(format!("{n:.decimals$}"))
}

fn default(value: &Value, args: &[Value]) -> Value {
    let empty = value.is_nullish() || value.as_str().is_some_and(str::is_empty);
    if empty {
        args.first().cloned().unwrap_or_default()
    } else {
        value.clone()
    }
}

fn length(value: &Value, _args: &[Value]) -> Value {
    match value {
        Value::String(_) | Value::Array(_) => value.get("length"),
        Value::Object(object) => Value::from(object.len()),
        _ => Value::from(0),
    }
}

fn join(value: &Value, args: &[Value]) -> Value {
    let Some(array) = value.as_array() else {
        return value.clone();
    };
    let separator = args.first().map_or_else(|| ",".to_string(), Value::to_display);
    Value::from(
        array
            .to_vec()
            .iter()
            .map(Value::to_display)
            .collect::<Vec<_>>()
            .join(&separator),
    )
}
