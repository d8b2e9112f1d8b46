//! The tagged value type carried across ports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// A value attached to a port firing (§3.1).
///
/// Cheap to clone: `Value` is used with move semantics when an event has a
/// single destination and cloned only on fan-out (§3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Fixed-arity vector of doubles.
    Tuple(Vec<f64>),
    /// Ordered, heterogeneous list.
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// 2-D grid of arbitrary values, as produced by an output plugin's
    /// `finish`.
    Matrix(Vec<Vec<Value>>),
    /// 2-D grid restricted to doubles, the common case for numeric output.
    Table(Vec<Vec<f64>>),
    Xml(String),
}

impl Value {
    /// Returns the contained `f64` if this value is numeric (`Int` or
    /// `Double`), otherwise `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Tuple(t) => write!(f, "{t:?}"),
            Value::Set(s) => write!(f, "{s:?}"),
            Value::Map(m) => write!(f, "{m:?}"),
            Value::Matrix(m) => write!(f, "matrix[{}x{}]", m.len(), m.first().map_or(0, Vec::len)),
            Value::Table(t) => write!(f, "table[{}x{}]", t.len(), t.first().map_or(0, Vec::len)),
            Value::Xml(x) => write!(f, "{x}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
