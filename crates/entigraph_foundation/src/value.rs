//! Field values stored in entity records.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::symbolic::SymbolicId;
use crate::types::FieldType;

/// Value of a single entity field.
///
/// Values are immutable and cheap to clone: strings are reference counted
/// and lists use a persistent vector with structural sharing.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// Absent value. A required field holding `Null` is uninitialized.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// String value.
    String(Arc<str>),
    /// Soft link to another entity by its symbolic id.
    Symbolic(SymbolicId),
    /// Persistent list.
    List(im::Vector<Value>),
}

// Floats compare by bit pattern so a NaN field equals itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbolic(a), Self::Symbolic(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    /// Builds a list value from an iterator of values.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Returns the narrowest type describing this value.
    #[must_use]
    pub fn value_type(&self) -> FieldType {
        match self {
            Self::Null | Self::List(_) => FieldType::Any,
            Self::Bool(_) => FieldType::Bool,
            Self::Int(_) => FieldType::Int,
            Self::Float(_) => FieldType::Float,
            Self::String(_) => FieldType::String,
            Self::Symbolic(_) => FieldType::Symbolic,
        }
    }

    /// Returns true if this value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a float value.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a symbolic id.
    #[must_use]
    pub fn as_symbolic(&self) -> Option<&SymbolicId> {
        match self {
            Self::Symbolic(id) => Some(id),
            _ => None,
        }
    }

    /// Attempts to extract a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&im::Vector<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Calls `f` for every symbolic id held by this value, recursing into lists.
    pub fn for_each_symbolic(&self, f: &mut impl FnMut(&SymbolicId)) {
        match self {
            Self::Symbolic(id) => f(id),
            Self::List(items) => items.iter().for_each(|v| v.for_each_symbolic(f)),
            _ => {}
        }
    }

    /// Returns a copy with every occurrence of `old` replaced by `new`.
    ///
    /// Returns `None` when the value holds no occurrence of `old`, so callers
    /// can tell a rewrite from a no-op without comparing values.
    #[must_use]
    pub fn replace_symbolic(&self, old: &SymbolicId, new: &SymbolicId) -> Option<Value> {
        match self {
            Self::Symbolic(id) if id == old => Some(Self::Symbolic(new.clone())),
            Self::List(items) => {
                let mut changed = false;
                let replaced: im::Vector<Value> = items
                    .iter()
                    .map(|v| match v.replace_symbolic(old, new) {
                        Some(r) => {
                            changed = true;
                            r
                        }
                        None => v.clone(),
                    })
                    .collect();
                changed.then_some(Self::List(replaced))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Symbolic(id) => write!(f, "@{id}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<SymbolicId> for Value {
    fn from(id: SymbolicId) -> Self {
        Self::Symbolic(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
