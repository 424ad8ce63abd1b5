// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Key and value model stored in a persistent map.
//!
//! Keys are restricted to hashable primitives with a total order, so a
//! [`Mapping`] is a `BTreeMap` and iterates deterministically. Values add floats,
//! containers, and [`Record`]s (typed values whose binary encoding embeds a
//! symbolic [`TypeRef`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Top-level contents of a persistent map.
pub type Mapping = BTreeMap<Key, Value>;

/// Map key. Only primitive kinds are allowed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Boolean key.
    Bool(bool),
    /// Signed integer key.
    Int(i64),
    /// UTF-8 string key.
    Text(String),
    /// Raw byte-string key.
    Bytes(Vec<u8>),
}

impl Key {
    /// Kind of this key, using the value vocabulary.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Borrow the key as a string if it is [`Key::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "b\"{}\"", hex::encode(b)),
        }
    }
}

/// Symbolic reference to a type exported by a named module.
///
/// Binary formats write the reference as `module::name` and must resolve it
/// against a [`ModuleTable`](crate::ModuleTable) on both encode and decode.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeRef {
    /// Module that exports the type.
    pub module: String,
    /// Type name within the module.
    pub name: String,
}

impl TypeRef {
    /// Build a reference to `module::name`.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Parse the `module::name` form; the module part may itself contain `::`.
    pub fn parse(path: &str) -> Option<Self> {
        let (module, name) = path.rsplit_once("::")?;
        if module.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(module, name))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// A typed value: a type reference plus named fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Type this record is an instance of.
    pub type_ref: TypeRef,
    /// Field values keyed by name.
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Value stored under a key.
///
/// Equality is structural. `Float(NaN)` never equals itself, which makes a map
/// holding NaN permanently dirty rather than silently clean.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Unordered set of primitives.
    Set(BTreeSet<Key>),
    /// Nested mapping.
    Map(BTreeMap<Key, Value>),
    /// Typed record.
    Record(Record),
}

/// Primitive kind of a [`Value`] (or [`Key`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// [`Value::Null`].
    Null,
    /// [`Value::Bool`].
    Bool,
    /// [`Value::Int`].
    Int,
    /// [`Value::Float`].
    Float,
    /// [`Value::Text`].
    Text,
    /// [`Value::Bytes`].
    Bytes,
    /// [`Value::List`].
    List,
    /// [`Value::Set`].
    Set,
    /// [`Value::Map`].
    Map,
    /// [`Value::Record`].
    Record,
}

impl ValueKind {
    /// Lowercase name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
            Self::Record => "record",
        }
    }

    /// Containers are the kinds whose contents can change without the
    /// top-level slot being reassigned.
    pub fn is_container(self) -> bool {
        matches!(self, Self::List | Self::Set | Self::Map | Self::Record)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::List(_) => ValueKind::List,
            Self::Set(_) => ValueKind::Set,
            Self::Map(_) => ValueKind::Map,
            Self::Record(_) => ValueKind::Record,
        }
    }

    /// Integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float payload, if any.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable list payload, if any.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "b\"{}\"", hex::encode(b)),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Set(keys) => {
                f.write_str("{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("}")
            }
            Self::Map(entries) => fmt_entries(f, entries.iter()),
            Self::Record(record) => {
                write!(f, "{}", record.type_ref)?;
                f.write_str("(")?;
                for (i, (name, value)) in record.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Render `{k: v, ...}`; shared with the map's `Display`.
pub(crate) fn fmt_entries<'a>(
    f: &mut fmt::Formatter<'_>,
    entries: impl Iterator<Item = (&'a Key, &'a Value)>,
) -> fmt::Result {
    f.write_str("{")?;
    for (i, (key, value)) in entries.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key}: {value}")?;
    }
    f.write_str("}")
}

// ── Conversions ─────────────────────────────────────────────────────────

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        match k {
            Key::Bool(b) => Self::Bool(b),
            Key::Int(n) => Self::Int(n),
            Key::Text(s) => Self::Text(s),
            Key::Bytes(b) => Self::Bytes(b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeSet<Key>> for Value {
    fn from(keys: BTreeSet<Key>) -> Self {
        Self::Set(keys)
    }
}

impl From<BTreeMap<Key, Value>> for Value {
    fn from(entries: BTreeMap<Key, Value>) -> Self {
        Self::Map(entries)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
