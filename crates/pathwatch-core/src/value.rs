#![forbid(unsafe_code)]

//! Dynamic value model shared by the observation core and the expression engine.
//!
//! A [`Value`] is either a primitive or a shared handle to a container
//! ([`Object`], [`Array`]) or a callable ([`Function`]). Handles are cheap to
//! clone; cloning a handle never copies the container, so two clones observe
//! the same mutations. Container identity is the allocation, surfaced as a
//! process-unique [`ObjectId`].
//!
//! # Invariants
//!
//! 1. An `ObjectId` is never reused, even after its container is dropped.
//! 2. Reading a field never holds an interior borrow while a getter runs, so
//!    getters may freely read (or write) their own object.
//! 3. `PartialEq` on `Value` is strict equality: primitives by value (`NaN` is
//!    unequal to itself), handles by identity. Structural comparison lives in
//!    [`crate::equals`].
//!
//! The `*_raw` mutators change storage without notifying anyone. Observable
//! writes go through the mediated API in `pathwatch-observe`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a container or function handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric identity.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Accessor evaluated on every read of a computed field.
pub type Getter = Rc<dyn Fn(&Object) -> Value>;

/// Native callable: `(receiver, arguments) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Value;

/// Storage for one object property.
///
/// Whether a property is computed is decided when it is defined, not
/// discovered by reflection at observation time.
#[derive(Clone)]
pub enum Field {
    /// A plain stored value; writes can be intercepted.
    Stored(Value),
    /// An accessor; writes to its dependencies cannot be seen, only polled.
    Computed(Getter),
}

impl Field {
    /// Create a stored field.
    pub fn stored(value: impl Into<Value>) -> Self {
        Self::Stored(value.into())
    }

    /// Create a computed field from a getter.
    pub fn computed(getter: impl Fn(&Object) -> Value + 'static) -> Self {
        Self::Computed(Rc::new(getter))
    }

    /// Whether this field is accessor-backed.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored(value) => f.debug_tuple("Stored").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(<getter>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

struct ObjectInner {
    id: ObjectId,
    fields: RefCell<BTreeMap<String, Field>>,
}

/// Shared handle to a keyed container.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                fields: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Builder: store `value` under `key`.
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_raw(key, value);
        self
    }

    /// Builder: define a computed field.
    #[must_use]
    pub fn with_getter(
        self,
        key: impl Into<String>,
        getter: impl Fn(&Object) -> Value + 'static,
    ) -> Self {
        self.define_raw(key, Field::computed(getter));
        self
    }

    /// Identity of this object.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Weak handle that does not keep the object alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Read `key`, running the getter for computed fields.
    ///
    /// Missing keys read as [`Value::Undefined`].
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let field = self.inner.fields.borrow().get(key).cloned();
        match field {
            None => Value::Undefined,
            Some(Field::Stored(value)) => value,
            Some(Field::Computed(getter)) => getter(self),
        }
    }

    /// The raw field stored under `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Field> {
        self.inner.fields.borrow().get(key).cloned()
    }

    /// Whether the object has its own field `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
    }

    /// Whether `key` is defined as a computed field.
    #[must_use]
    pub fn is_computed(&self, key: &str) -> bool {
        self.inner
            .fields
            .borrow()
            .get(key)
            .is_some_and(Field::is_computed)
    }

    /// Snapshot of the keys, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Snapshot of every `(key, field)` pair.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Field)> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|(k, f)| (k.clone(), f.clone()))
            .collect()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    /// Whether the object has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.fields.borrow().is_empty()
    }

    /// Store `value` under `key` without notification. Returns the previous field.
    pub fn set_raw(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Field> {
        self.define_raw(key, Field::Stored(value.into()))
    }

    /// Define `key` as `field` without notification. Returns the previous field.
    pub fn define_raw(&self, key: impl Into<String>, field: Field) -> Option<Field> {
        self.inner.fields.borrow_mut().insert(key.into(), field)
    }

    /// Remove `key` without notification. Returns the removed field.
    pub fn remove_raw(&self, key: &str) -> Option<Field> {
        self.inner.fields.borrow_mut().remove(key)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object{} ", self.id())?;
        let fields = self.inner.fields.borrow();
        let mut map = f.debug_map();
        for (key, field) in fields.iter() {
            match field {
                Field::Stored(value) => map.entry(key, &Shallow(value)),
                Field::Computed(_) => map.entry(key, &format_args!("<computed>")),
            };
        }
        map.finish()
    }
}

/// Weak counterpart of [`Object`].
#[derive(Debug, Clone)]
pub struct WeakObject {
    id: ObjectId,
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// Identity of the referenced object (valid even after it is dropped).
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Upgrade to a strong handle if the object is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

struct ArrayInner {
    id: ObjectId,
    items: RefCell<Vec<Value>>,
}

/// Shared handle to an ordered container.
///
/// Arrays expose integer-string keys (`"0"`, `"1"`, ...) and `"length"` to the
/// key-based API.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    /// Create an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create an array owning `items`.
    #[must_use]
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                id: ObjectId::next(),
                items: RefCell::new(items),
            }),
        }
    }

    /// Create an array from anything convertible to values.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::from_vec(values.into_iter().map(Into::into).collect())
    }

    /// Identity of this array.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Whether both handles refer to the same array.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Weak handle that does not keep the array alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakArray {
        WeakArray {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Whether the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Element at `index`, or `Undefined` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Key-based read: an index string or `"length"`.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Value {
        if key == "length" {
            return Value::from(self.len());
        }
        array_index(key).map_or(Value::Undefined, |index| self.get(index))
    }

    /// Snapshot of the elements (handles are shared, not copied).
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Write `value` at `index`, padding with `Undefined` when past the end.
    pub fn set_raw(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.inner.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    /// Truncate or pad the array to `len` elements.
    pub fn resize_raw(&self, len: usize) {
        self.inner.items.borrow_mut().resize(len, Value::Undefined);
    }

    /// Replace every element, returning the previous contents.
    pub fn replace_raw(&self, items: Vec<Value>) -> Vec<Value> {
        std::mem::replace(&mut *self.inner.items.borrow_mut(), items)
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array{} ", self.id())?;
        let items = self.inner.items.borrow();
        f.debug_list().entries(items.iter().map(Shallow)).finish()
    }
}

/// Weak counterpart of [`Array`].
#[derive(Debug, Clone)]
pub struct WeakArray {
    id: ObjectId,
    inner: Weak<ArrayInner>,
}

impl WeakArray {
    /// Identity of the referenced array.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Upgrade to a strong handle if the array is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Array> {
        self.inner.upgrade().map(|inner| Array { inner })
    }
}

/// Largest array length. Indices run from 0 to `MAX_ARRAY_LENGTH - 1`.
pub const MAX_ARRAY_LENGTH: u32 = u32::MAX;

/// Parse a canonical array index (`"0"`, `"12"`; not `"01"` or `"+1"`).
///
/// Keys at or above [`MAX_ARRAY_LENGTH`] are not indices.
#[must_use]
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    key.parse::<u32>()
        .ok()
        .filter(|&index| index < MAX_ARRAY_LENGTH)
        .and_then(|index| usize::try_from(index).ok())
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

struct FunctionInner {
    id: ObjectId,
    call: Box<NativeFn>,
}

/// Shared handle to a native callable.
#[derive(Clone)]
pub struct Function {
    inner: Rc<FunctionInner>,
}

impl Function {
    /// Wrap a closure receiving `(receiver, arguments)`.
    pub fn new(call: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        Self {
            inner: Rc::new(FunctionInner {
                id: ObjectId::next(),
                call: Box::new(call),
            }),
        }
    }

    /// Identity of this function.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Whether both handles refer to the same function.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Invoke with `receiver` bound as the call target.
    pub fn call(&self, receiver: &Value, args: &[Value]) -> Value {
        (self.inner.call)(receiver, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function{}", self.id())
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
    Function(Function),
}

impl Value {
    /// Short type tag, mostly for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Function(_) => "function",
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// `undefined` or `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Containers that can carry observers: objects and arrays.
    #[must_use]
    pub fn is_object_like(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(function) => Some(function),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Identity of a handle value; `None` for primitives.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object(object) => Some(object.id()),
            Self::Array(array) => Some(array.id()),
            Self::Function(function) => Some(function.id()),
            _ => None,
        }
    }

    /// Weak handle for object-like values.
    #[must_use]
    pub fn downgrade(&self) -> Option<WeakValue> {
        match self {
            Self::Object(object) => Some(WeakValue::Object(object.downgrade())),
            Self::Array(array) => Some(WeakValue::Array(array.downgrade())),
            _ => None,
        }
    }

    /// Property read. Never fails: non-containers and missing keys read as
    /// `Undefined`. Strings expose `length` and character indices.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        match self {
            Self::Object(object) => object.get(key),
            Self::Array(array) => array.get_key(key),
            Self::String(s) => {
                if key == "length" {
                    Value::from(s.chars().count())
                } else {
                    array_index(key)
                        .and_then(|index| s.chars().nth(index))
                        .map_or(Value::Undefined, |c| Value::from(c.to_string()))
                }
            }
            _ => Value::Undefined,
        }
    }

    /// Numeric coercion.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Array(array) => match array.len() {
                0 => 0.0,
                1 => array.get(0).to_number(),
                _ => f64::NAN,
            },
            Self::Object(_) | Self::Function(_) => f64::NAN,
        }
    }

    /// Truthiness used by `!` and the `default` filter.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Object(_) | Self::Array(_) | Self::Function(_) => true,
        }
    }

    /// String rendering for templates. `undefined` and `null` render empty.
    #[must_use]
    pub fn to_display(&self) -> String {
        match self {
            Self::Undefined | Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Array(array) => array
                .to_vec()
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(","),
            Self::Function(_) => "function".to_string(),
        }
    }
}

/// Render a number the way templates expect: integers without a fraction.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        // -0 renders as 0.
        return format!("{}", n as i64);
    }
    format!("{n}")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equals::same(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(object) => fmt::Debug::fmt(object, f),
            Self::Array(array) => fmt::Debug::fmt(array, f),
            Self::Function(function) => fmt::Debug::fmt(function, f),
        }
    }
}

/// Debug adapter that prints nested handles by identity only, so cyclic
/// graphs format in finite time.
struct Shallow<'a>(&'a Value);

impl fmt::Debug for Shallow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Object(object) => write!(f, "Object{}", object.id()),
            Value::Array(array) => write!(f, "Array{}", array.id()),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Weak counterpart of an object-like [`Value`].
#[derive(Debug, Clone)]
pub enum WeakValue {
    Object(WeakObject),
    Array(WeakArray),
}

impl WeakValue {
    /// Identity of the referenced container.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Object(weak) => weak.id(),
            Self::Array(weak) => weak.id(),
        }
    }

    /// Upgrade to a strong value if the container is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Object(weak) => weak.upgrade().map(Value::Object),
            Self::Array(weak) => weak.upgrade().map(Value::Array),
        }
    }

    /// Whether the container is still reachable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Object(weak) => weak.inner.strong_count() > 0,
            Self::Array(weak) => weak.inner.strong_count() > 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(Array::from_vec(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}
