//! Per-type slot tables with generation tracking.
//!
//! Each entity type owns one `Arena`. Slots are never compacted: removing an
//! entity leaves a hole that a later allocation may reuse under a newer
//! generation.

// Slot indices are u32 by construction
#![allow(clippy::cast_possible_truncation)]

use entigraph_foundation::{EntityId, Error, Result, TypeTag};

/// Slot allocator for one entity type.
///
/// Generations are stored in a persistent vector so that cloning an arena
/// (which every copy-on-write partition update does) is O(1).
#[derive(Debug, Clone)]
pub struct Arena {
    type_tag: TypeTag,
    /// Generation counter for each slot.
    /// Even generations are free, odd generations are alive.
    generations: im::Vector<u32>,
    /// Free list of slots available for reuse.
    free_list: im::Vector<u32>,
    /// Count of live slots.
    live_count: usize,
}

impl Arena {
    /// Creates an empty arena for `type_tag`.
    #[must_use]
    pub fn new(type_tag: TypeTag) -> Self {
        Self {
            type_tag,
            generations: im::Vector::new(),
            free_list: im::Vector::new(),
            live_count: 0,
        }
    }

    /// Allocates a slot and returns the id naming it.
    ///
    /// Reuses slots from the free list when available.
    pub fn allocate(&mut self) -> EntityId {
        self.live_count += 1;

        if let Some(index) = self.free_list.pop_back() {
            let idx = index as usize;
            // Was even/free, now odd/alive
            let generation = self.generations[idx] + 1;
            self.generations.set(idx, generation);
            EntityId::new(self.type_tag, index, generation)
        } else {
            let index = self.generations.len() as u32;
            // New slots start at generation 1 (odd = alive)
            self.generations.push_back(1);
            EntityId::new(self.type_tag, index, 1)
        }
    }

    /// Frees a slot.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is stale or already freed.
    pub fn free(&mut self, id: EntityId) -> Result<()> {
        self.validate(id)?;

        let idx = id.index as usize;
        // Was odd/alive, now even/free
        self.generations.set(idx, id.generation + 1);
        self.free_list.push_back(id.index);
        self.live_count -= 1;

        Ok(())
    }

    /// Checks if an id names a live slot.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        id.type_tag == self.type_tag
            && self
                .generations
                .get(id.index as usize)
                .is_some_and(|generation| *generation == id.generation && generation % 2 == 1)
    }

    /// Validates that an id names a live slot.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for ids of another type, never-allocated slots,
    /// freed slots, and stale generations alike.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        if self.exists(id) {
            Ok(())
        } else {
            Err(Error::not_found(id))
        }
    }

    /// Returns the number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no slot is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Iterates over live ids in slot order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        let type_tag = self.type_tag;
        self.generations
            .iter()
            .enumerate()
            .filter(|(_, generation)| *generation % 2 == 1)
            .map(move |(idx, generation)| EntityId::new(type_tag, idx as u32, *generation))
    }

    /// Returns the current generation of a slot, if it was ever allocated.
    #[must_use]
    pub fn generation(&self, index: u32) -> Option<u32> {
        self.generations.get(index as usize).copied()
    }
}
