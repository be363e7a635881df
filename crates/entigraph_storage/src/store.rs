//! Record storage partitioned by entity type.
//!
//! Each type gets its own [`Partition`] behind an `Arc`. Writing to one type
//! copies only that partition's root; every other partition stays shared
//! with the snapshot the store was cloned from.

use std::sync::Arc;

use entigraph_foundation::{EntityId, Error, Result, TypeTag};

use crate::arena::Arena;
use crate::record::EntityData;

/// Slots and records of one entity type.
#[derive(Clone, Debug)]
pub struct Partition {
    arena: Arena,
    records: im::Vector<Option<EntityData>>,
}

impl Partition {
    fn new(type_tag: TypeTag) -> Self {
        Self {
            arena: Arena::new(type_tag),
            records: im::Vector::new(),
        }
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns true if the partition holds no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

/// Typed record store: one copy-on-write partition per entity type.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    partitions: Vec<Arc<Partition>>,
}

impl RecordStore {
    /// Creates a store with one empty partition per type.
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = TypeTag>) -> Self {
        Self {
            partitions: types
                .into_iter()
                .map(|tag| Arc::new(Partition::new(tag)))
                .collect(),
        }
    }

    fn partition(&self, tag: TypeTag) -> Result<&Partition> {
        self.partitions
            .get(tag.index())
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::schema(format!("unknown entity type {tag:?}")))
    }

    fn partition_mut(&mut self, tag: TypeTag) -> Result<&mut Partition> {
        self.partitions
            .get_mut(tag.index())
            .map(Arc::make_mut)
            .ok_or_else(|| Error::schema(format!("unknown entity type {tag:?}")))
    }

    /// Allocates an id for a new entity of type `tag`.
    ///
    /// The slot has no record until [`put`](Self::put) is called.
    ///
    /// # Errors
    ///
    /// Returns a schema error for unknown types.
    pub fn allocate(&mut self, tag: TypeTag) -> Result<EntityId> {
        let partition = self.partition_mut(tag)?;
        let id = partition.arena.allocate();
        let idx = id.index as usize;
        if idx == partition.records.len() {
            partition.records.push_back(None);
        }
        Ok(id)
    }

    /// Returns true if `id` names a live entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.partition(id.type_tag).is_ok_and(|p| p.arena.exists(id))
    }

    /// Gets the record of a live entity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is not live.
    pub fn get(&self, id: EntityId) -> Result<&EntityData> {
        let partition = self
            .partition(id.type_tag)
            .map_err(|_| Error::not_found(id))?;
        partition.arena.validate(id)?;
        partition
            .records
            .get(id.index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::not_found(id))
    }

    /// Stores the record of a live entity, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is not live, and `TypeMismatch` if the
    /// record's type differs from the id's.
    pub fn put(&mut self, id: EntityId, data: EntityData) -> Result<Option<EntityData>> {
        if data.type_tag() != id.type_tag {
            return Err(Error::type_mismatch(
                format!("record of {:?}", id.type_tag),
                format!("record of {:?}", data.type_tag()),
            ));
        }
        let partition = self
            .partition_mut(id.type_tag)
            .map_err(|_| Error::not_found(id))?;
        partition.arena.validate(id)?;
        Ok(partition.records.set(id.index as usize, Some(data)))
    }

    /// Frees an entity, returning its last record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is not live.
    pub fn free(&mut self, id: EntityId) -> Result<EntityData> {
        let partition = self
            .partition_mut(id.type_tag)
            .map_err(|_| Error::not_found(id))?;
        partition.arena.free(id)?;
        partition
            .records
            .set(id.index as usize, None)
            .ok_or_else(|| Error::not_found(id))
    }

    /// Iterates over live ids of type `tag` in slot order.
    pub fn ids(&self, tag: TypeTag) -> impl Iterator<Item = EntityId> + '_ {
        self.partitions
            .get(tag.index())
            .into_iter()
            .flat_map(|p| p.arena.iter())
    }

    /// Iterates over live ids of every type.
    pub fn all_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.partitions.iter().flat_map(|p| p.arena.iter())
    }

    /// Returns the number of live entities of type `tag`.
    #[must_use]
    pub fn len(&self, tag: TypeTag) -> usize {
        self.partitions.get(tag.index()).map_or(0, |p| p.len())
    }

    /// Returns the number of live entities of every type.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Returns true if both stores point at the same partition for `tag`.
    #[must_use]
    pub fn shares_partition(&self, other: &Self, tag: TypeTag) -> bool {
        match (self.partitions.get(tag.index()), other.partitions.get(tag.index())) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
