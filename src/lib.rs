//! Entigraph - versioned entity graph store
//!
//! This crate re-exports both layers of the store for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 1: entigraph_storage    - Schema, snapshots, builders, relations, soft links
//! Layer 0: entigraph_foundation - Core types (EntityId, Value, Error, StoreConfig)
//! ```

pub use entigraph_foundation as foundation;
pub use entigraph_storage as storage;
