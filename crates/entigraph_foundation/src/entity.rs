//! Type-partitioned entity identifiers with generational indices.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifies a concrete entity type registered in a schema.
///
/// Tags are dense: the n-th registered type gets tag `n`, which doubles as
/// the index of that type's partition in the record store.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeTag(u32);

impl TypeTag {
    /// Creates a tag from its raw index.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index of this tag.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the tag as a partition index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

/// Entity identifier: `(type, slot, generation)`.
///
/// The slot indexes the arena of the entity's own type. The generation
/// counter increments whenever the slot is freed, so an id held across a
/// removal no longer resolves even if the slot is reused later.
///
/// An id is only meaningful against the snapshot or builder lineage that
/// produced it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId {
    /// Concrete type of the entity.
    pub type_tag: TypeTag,
    /// Slot in the type's arena.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(type_tag: TypeTag, index: u32, generation: u32) -> Self {
        Self {
            type_tag,
            index,
            generation,
        }
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntityId({}:{}v{})",
            self.type_tag.0, self.index, self.generation
        )
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}:{})", self.type_tag.0, self.index)
    }
}
