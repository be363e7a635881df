//! Name-based identifiers: symbolic ids, entity sources, and capabilities.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::TypeTag;

/// Natural key naming one entity instance of a given type.
///
/// Unlike an [`EntityId`](crate::EntityId), a symbolic id survives removal
/// and re-creation of the entity it names, which is what lets other entities
/// refer to it through soft links instead of structural edges.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymbolicId {
    /// Type of the entity this id names.
    pub type_tag: TypeTag,
    /// The name itself.
    pub name: Arc<str>,
}

impl SymbolicId {
    /// Creates a symbolic id for an entity of type `type_tag`.
    #[must_use]
    pub fn new(type_tag: TypeTag, name: impl Into<Arc<str>>) -> Self {
        Self {
            type_tag,
            name: name.into(),
        }
    }

    /// Returns a copy of this id with a different name and the same type.
    #[must_use]
    pub fn renamed(&self, name: impl Into<Arc<str>>) -> Self {
        Self {
            type_tag: self.type_tag,
            name: name.into(),
        }
    }
}

impl fmt::Debug for SymbolicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolicId({}:{:?})", self.type_tag.raw(), self.name)
    }
}

impl fmt::Display for SymbolicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Provenance marker attached to every entity record.
///
/// The source records where an entity came from (a project file, an
/// importer, a test fixture). It never participates in value equality.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntitySource(Arc<str>);

impl EntitySource {
    /// Creates a source marker.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the marker's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for EntitySource {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl fmt::Debug for EntitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntitySource({:?})", self.0)
    }
}

/// An interface-like capability a concrete entity type may declare.
///
/// Abstract relation roles are typed by capability: any entity whose type
/// declares the capability may fill the role.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capability(Arc<str>);

impl Capability {
    /// Creates a capability with the given name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the capability name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
