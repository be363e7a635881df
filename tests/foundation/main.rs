//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, EntityId, SymbolicId, Error, and StoreConfig.

mod values;
