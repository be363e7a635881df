//! Field type descriptors for schema validation.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Type descriptor for an entity field.
///
/// Used by the schema to validate values as they are written. A field whose
/// type contains [`FieldType::Symbolic`] is a soft-link field: its values are
/// tracked by the soft-link index.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldType {
    /// Boolean type.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// String type.
    String,
    /// Symbolic id (soft link to another entity).
    Symbolic,
    /// Homogeneous list type.
    List(Box<FieldType>),
    /// Any type (accepts any value).
    Any,
}

impl FieldType {
    /// Creates a list type with the given element type.
    #[must_use]
    pub fn list(element: FieldType) -> Self {
        Self::List(Box::new(element))
    }

    /// Returns true if `value` is an instance of this type.
    ///
    /// `Null` is accepted by every type; whether a field may stay null is a
    /// question of the field's `required` flag, not its type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_) | Value::Int(_))
            | (Self::String, Value::String(_))
            | (Self::Symbolic, Value::Symbolic(_)) => true,
            (Self::List(element), Value::List(items)) => items.iter().all(|v| element.accepts(v)),
            _ => false,
        }
    }

    /// Returns true if values of this type can hold symbolic ids.
    #[must_use]
    pub fn is_soft_link(&self) -> bool {
        match self {
            Self::Symbolic | Self::Any => true,
            Self::List(element) => element.is_soft_link(),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Symbolic => write!(f, "symbolic-id"),
            Self::List(element) => write!(f, "[{element}]"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldType({self})")
    }
}
