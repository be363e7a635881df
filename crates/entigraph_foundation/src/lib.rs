//! Core identifiers, values, errors, and configuration for entigraph.
//!
//! This crate provides:
//! - [`EntityId`] - Type-partitioned generational entity identifiers
//! - [`SymbolicId`] - Name-based natural keys used by soft links
//! - [`Value`] - Field values stored in entity records
//! - [`FieldType`] - Field type descriptors for schema validation
//! - [`Error`] - Error taxonomy shared by every layer
//! - [`StoreConfig`] - Commit and indexing policy

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod entity;
pub mod error;
pub mod symbolic;
pub mod types;
pub mod value;

pub use config::{CommitStrictness, StoreConfig};
pub use entity::{EntityId, TypeTag};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use symbolic::{Capability, EntitySource, SymbolicId};
pub use types::FieldType;
pub use value::Value;
