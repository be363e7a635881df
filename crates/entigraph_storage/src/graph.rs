//! The root store: holds the current snapshot and publishes commits.

use std::fmt;
use std::sync::Arc;

use entigraph_foundation::{Error, ErrorKind, Result, StoreConfig};
use tracing::debug;

use crate::builder::{Builder, Commit};
use crate::change::ChangeSet;
use crate::schema::{Schema, SchemaProvider};
use crate::snapshot::Snapshot;

/// Receives every change set the root store publishes.
///
/// Observers run synchronously inside [`EntityGraph::commit`], after the new
/// snapshot became current.
pub trait ChangeObserver: Send + Sync {
    /// Called once per successful commit that changed something.
    fn changes_committed(&self, snapshot: &Snapshot, changes: &ChangeSet);
}

/// Root of a versioned entity graph.
///
/// Hands out snapshots for reading and builders for writing, and folds
/// committed builders back in. Only a builder derived from the current
/// snapshot may be committed; builders derived from older snapshots must be
/// rebuilt on top of the newer state.
pub struct EntityGraph {
    current: Snapshot,
    observers: Vec<Arc<dyn ChangeObserver>>,
}

impl EntityGraph {
    /// Creates an empty graph for `schema` with the default configuration.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Creates an empty graph for `schema`.
    #[must_use]
    pub fn with_config(schema: Schema, config: StoreConfig) -> Self {
        Self {
            current: Snapshot::with_config(schema, config),
            observers: Vec::new(),
        }
    }

    /// Creates an empty graph from a schema provider.
    ///
    /// # Errors
    ///
    /// Returns whatever error the provider reports.
    pub fn from_provider(provider: &impl SchemaProvider, config: StoreConfig) -> Result<Self> {
        Ok(Self::with_config(provider.provide_schema()?, config))
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.current.clone()
    }

    /// Starts a builder over the current snapshot.
    #[must_use]
    pub fn builder(&self) -> Builder {
        self.current.builder()
    }

    /// Registers an observer for future commits.
    pub fn add_observer(&mut self, observer: Arc<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    /// Commits `builder` and makes the result current.
    ///
    /// # Errors
    ///
    /// Returns `StaleBuilder` if the builder's base is not the current
    /// snapshot of this graph, and any error of [`Builder::commit`]. A
    /// builder from another graph, or from a snapshot committed outside this
    /// graph, is stale even when its base has the current version number.
    pub fn commit(&mut self, builder: &mut Builder) -> Result<ChangeSet> {
        if !builder.base().same_snapshot(&self.current) {
            return Err(Error::new(ErrorKind::StaleBuilder {
                base: builder.base().version(),
                current: self.current.version(),
            }));
        }

        let Commit { snapshot, changes } = builder.commit()?;
        if changes.is_empty() {
            return Ok(changes);
        }

        self.current = snapshot;
        debug!(
            version = self.current.version(),
            observers = self.observers.len(),
            "published snapshot"
        );
        for observer in &self.observers {
            observer.changes_committed(&self.current, &changes);
        }
        Ok(changes)
    }

    /// Runs `edit` against a fresh builder and commits it.
    ///
    /// # Errors
    ///
    /// Returns the first error of `edit` (nothing is committed then) or of
    /// [`commit`](Self::commit).
    pub fn update<T>(
        &mut self,
        edit: impl FnOnce(&mut Builder) -> Result<T>,
    ) -> Result<(T, ChangeSet)> {
        let mut builder = self.builder();
        let value = edit(&mut builder)?;
        let changes = self.commit(&mut builder)?;
        Ok((value, changes))
    }
}

impl fmt::Debug for EntityGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityGraph")
            .field("version", &self.current.version())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
