//! Versioned entity graph storage for entigraph.
//!
//! This crate provides:
//! - [`Schema`] - Entity types, fields, and the connections between them
//! - [`Snapshot`] - Immutable, structurally shared view of the store
//! - [`Builder`] - Copy-on-write transaction over a snapshot
//! - [`RelationIndex`] - Bidirectional parent/child indices per connection
//! - [`SoftLinkIndex`] - Reverse index of symbolic references
//! - [`DetachedEntity`] - Entity trees built outside a store and attached later
//! - [`EntityGraph`] - Root store that publishes commits to observers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod builder;
pub mod change;
pub mod detached;
pub mod graph;
pub mod record;
pub mod relation;
pub mod schema;
pub mod snapshot;
pub mod soft_link;
pub mod state;
pub mod store;

pub use arena::Arena;
pub use builder::{Builder, Commit};
pub use change::{ChangeEvent, ChangeSet, WriteOp};
pub use detached::DetachedEntity;
pub use graph::{ChangeObserver, EntityGraph};
pub use record::EntityData;
pub use relation::{Edge, RelationDelta, RelationIndex};
pub use schema::{
    Cardinality, ConnectionId, EntitySchema, FieldSchema, Role, Schema, SchemaProvider,
};
pub use snapshot::Snapshot;
pub use soft_link::{SoftLink, SoftLinkIndex, SymbolicIndex};
pub use state::{EntityStorage, StoreState};
pub use store::{Partition, RecordStore};
