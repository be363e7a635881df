//! Immutable snapshots of the entity graph.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use entigraph_foundation::{StoreConfig, TypeTag};

use crate::builder::Builder;
use crate::schema::Schema;
use crate::state::{EntityStorage, StoreState};

static NEXT_SNAPSHOT: AtomicU64 = AtomicU64::new(1);

/// Immutable, point-in-time view of the entity graph.
///
/// Clone is O(1) due to structural sharing. Snapshots are `Send + Sync` and
/// can be read from any number of threads without locking. All mutation goes
/// through a [`Builder`] derived from a snapshot.
///
/// Every created or committed snapshot gets a process-unique id. Clones keep
/// it, so two snapshots with the same id are the same point in the same
/// lineage, while equal versions alone prove nothing.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub(crate) state: StoreState,
    id: u64,
    version: u64,
}

impl Snapshot {
    /// Creates an empty snapshot for `schema` with the default configuration.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Creates an empty snapshot for `schema`.
    #[must_use]
    pub fn with_config(schema: Schema, config: StoreConfig) -> Self {
        Self::from_state(StoreState::new(Arc::new(schema), Arc::new(config)), 0)
    }

    pub(crate) fn from_state(state: StoreState, version: u64) -> Self {
        Self {
            state,
            id: NEXT_SNAPSHOT.fetch_add(1, Ordering::Relaxed),
            version,
        }
    }

    /// Returns true if `other` is this very snapshot or a clone of it.
    #[must_use]
    pub fn same_snapshot(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Commit counter: 0 for an empty store, bumped by every commit that
    /// changed something.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Starts a builder over this snapshot.
    #[must_use]
    pub fn builder(&self) -> Builder {
        Builder::new(self.clone())
    }

    /// Returns true if both snapshots hold the same entities, records, edges,
    /// and index entries. Versions are not compared.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.state.structurally_eq(&other.state)
    }

    /// Returns true if this snapshot shares the record partition of `tag`
    /// with `other`, i.e. neither wrote to that type since they diverged.
    #[must_use]
    pub fn shares_partition_with(&self, other: &Self, tag: TypeTag) -> bool {
        self.state.records.shares_partition(&other.state.records, tag)
    }
}

impl EntityStorage for Snapshot {
    fn state(&self) -> &StoreState {
        &self.state
    }
}
