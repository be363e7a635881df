//! Store state shared by snapshots and builders, and the read API over it.

use std::sync::Arc;

use entigraph_foundation::{EntityId, EntitySource, Error, Result, StoreConfig, SymbolicId, TypeTag};

use crate::change::ChangeSet;
use crate::record::EntityData;
use crate::relation::RelationIndex;
use crate::schema::{Cardinality, ConnectionId, Schema};
use crate::soft_link::{SoftLink, SoftLinkIndex, SymbolicIndex};
use crate::store::RecordStore;

/// Everything a snapshot holds.
///
/// Clone is O(1): every component is either an `Arc` or a persistent
/// structure.
#[derive(Clone, Debug)]
pub struct StoreState {
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: Arc<StoreConfig>,
    pub(crate) records: RecordStore,
    pub(crate) relations: RelationIndex,
    pub(crate) soft_links: SoftLinkIndex,
    pub(crate) symbolic: SymbolicIndex,
}

impl StoreState {
    pub(crate) fn new(schema: Arc<Schema>, config: Arc<StoreConfig>) -> Self {
        let records = RecordStore::new(schema.type_tags());
        Self {
            schema,
            config,
            records,
            relations: RelationIndex::new(),
            soft_links: SoftLinkIndex::new(),
            symbolic: SymbolicIndex::new(),
        }
    }

    /// Returns true if both states hold the same entities with equal
    /// records (provenance included), the same edges, and the same indices.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        let same_ids = self.records.total_len() == other.records.total_len()
            && self.records.all_ids().all(|id| other.records.contains(id));
        same_ids
            && self.records.all_ids().all(|id| {
                match (self.records.get(id), other.records.get(id)) {
                    (Ok(a), Ok(b)) => a.equals_with_source(b),
                    _ => false,
                }
            })
            && self.relations.same_edges(&other.relations)
            && self.soft_links.same_entries(&other.soft_links)
            && self.symbolic.same_entries(&other.symbolic)
    }

    /// Verifies that a live entity may be committed: required fields are
    /// set and every non-nullable connection it is a child of has a parent.
    pub(crate) fn check_initialization(&self, id: EntityId) -> Result<()> {
        let data = self.records.get(id)?;
        let entity = self.schema.entity(id.type_tag)?;
        if let Some(field) = entity
            .fields
            .iter()
            .find(|f| f.required && !data.is_initialized(&f.name))
        {
            return Err(Error::uninitialized_field(&*entity.name, &*field.name));
        }
        for connection in self.schema.connections_as_child(id.type_tag) {
            if !connection.is_child_nullable() && self.relations.parent(connection, id).is_none() {
                return Err(Error::consistency(
                    &*entity.name,
                    connection.name(),
                    "missing required parent",
                ));
            }
        }
        Ok(())
    }

    fn check_symbolic_unique(&self, id: EntityId) -> Result<()> {
        if !self.config.unique_symbolic_ids {
            return Ok(());
        }
        let Some(symbolic) = self.symbolic.symbolic_id(id) else {
            return Ok(());
        };
        let owners = self.symbolic.owners(symbolic);
        if owners.len() > 1 {
            let entity = self.schema.entity(id.type_tag)?;
            let field = entity.symbolic_field.as_deref().unwrap_or("symbolic id");
            return Err(Error::consistency(
                &*entity.name,
                field,
                format!("symbolic id `{symbolic}` is owned by {} entities", owners.len()),
            ));
        }
        Ok(())
    }

    /// The first touched entity, in id order, that may not be committed.
    pub(crate) fn first_violation(&self, changes: &ChangeSet) -> Option<(EntityId, Error)> {
        changes
            .touched()
            .into_iter()
            .filter(|id| self.records.contains(*id))
            .find_map(|id| {
                self.check_initialization(id)
                    .and_then(|()| self.check_symbolic_unique(id))
                    .err()
                    .map(|err| (id, err))
            })
    }

    pub(crate) fn expect_cardinality(
        &self,
        connection: &ConnectionId,
        accepted: &[Cardinality],
    ) -> Result<()> {
        if !self.schema.has_connection(connection) {
            return Err(Error::schema(format!("unknown connection {connection:?}")));
        }
        if accepted.contains(&connection.cardinality()) {
            Ok(())
        } else {
            Err(Error::schema(format!(
                "{connection:?} is not {}",
                accepted
                    .iter()
                    .map(|c| format!("{c:?}"))
                    .collect::<Vec<_>>()
                    .join(" or ")
            )))
        }
    }
}

/// Read access to a store state.
///
/// Implemented by [`Snapshot`](crate::Snapshot) and
/// [`Builder`](crate::Builder), so a builder reads its own writes through
/// the same API a snapshot offers.
pub trait EntityStorage {
    /// The state to read from.
    fn state(&self) -> &StoreState;

    /// The schema the store was created with.
    fn schema(&self) -> &Schema {
        &self.state().schema
    }

    /// The store configuration.
    fn config(&self) -> &StoreConfig {
        &self.state().config
    }

    /// Gets the record of an entity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for stale or unknown ids.
    fn get(&self, id: EntityId) -> Result<&EntityData> {
        self.state().records.get(id)
    }

    /// Returns true if `id` names a live entity.
    fn contains(&self, id: EntityId) -> bool {
        self.state().records.contains(id)
    }

    /// Live entities of type `tag`, in slot order.
    fn entities(&self, tag: TypeTag) -> Vec<EntityId> {
        self.state().records.ids(tag).collect()
    }

    /// Number of live entities of type `tag`.
    fn entity_count(&self, tag: TypeTag) -> usize {
        self.state().records.len(tag)
    }

    /// Number of live entities of every type.
    fn total_entity_count(&self) -> usize {
        self.state().records.total_len()
    }

    /// Parent of `child` in `connection`, whatever its cardinality.
    fn parent(&self, connection: &ConnectionId, child: EntityId) -> Option<EntityId> {
        self.state().relations.parent(connection, child)
    }

    /// Ordered children of `parent` in `connection`, whatever its cardinality.
    fn children(&self, connection: &ConnectionId, parent: EntityId) -> Vec<EntityId> {
        self.state().relations.children(connection, parent)
    }

    /// The single child of `parent` in a `OneToOne` connection.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the connection is unknown or has another
    /// cardinality.
    fn extract_one_to_one_child(
        &self,
        connection: &ConnectionId,
        parent: EntityId,
    ) -> Result<Option<EntityId>> {
        self.state().expect_cardinality(connection, &[Cardinality::OneToOne])?;
        Ok(self.children(connection, parent).first().copied())
    }

    /// The single child of `parent` in a `OneToAbstractOne` connection.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the connection is unknown or has another
    /// cardinality.
    fn extract_one_to_abstract_one_child(
        &self,
        connection: &ConnectionId,
        parent: EntityId,
    ) -> Result<Option<EntityId>> {
        self.state().expect_cardinality(connection, &[Cardinality::OneToAbstractOne])?;
        Ok(self.children(connection, parent).first().copied())
    }

    /// The ordered children of `parent` in a `OneToMany` connection.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the connection is unknown or has another
    /// cardinality.
    fn extract_one_to_many_children(
        &self,
        connection: &ConnectionId,
        parent: EntityId,
    ) -> Result<Vec<EntityId>> {
        self.state().expect_cardinality(connection, &[Cardinality::OneToMany])?;
        Ok(self.children(connection, parent))
    }

    /// The ordered children of `parent` in a `OneToAbstractMany` connection.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the connection is unknown or has another
    /// cardinality.
    fn extract_one_to_abstract_many_children(
        &self,
        connection: &ConnectionId,
        parent: EntityId,
    ) -> Result<Vec<EntityId>> {
        self.state().expect_cardinality(connection, &[Cardinality::OneToAbstractMany])?;
        Ok(self.children(connection, parent))
    }

    /// The parent of `child` in a single-child connection.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the connection is unknown or lets a parent
    /// hold several children.
    fn extract_one_to_one_parent(
        &self,
        connection: &ConnectionId,
        child: EntityId,
    ) -> Result<Option<EntityId>> {
        self.state().expect_cardinality(
            connection,
            &[Cardinality::OneToOne, Cardinality::OneToAbstractOne],
        )?;
        Ok(self.parent(connection, child))
    }

    /// The parent of `child` in a multi-child connection.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the connection is unknown or lets a parent
    /// hold only one child.
    fn extract_one_to_many_parent(
        &self,
        connection: &ConnectionId,
        child: EntityId,
    ) -> Result<Option<EntityId>> {
        self.state().expect_cardinality(
            connection,
            &[Cardinality::OneToMany, Cardinality::OneToAbstractMany],
        )?;
        Ok(self.parent(connection, child))
    }

    /// The entity owning symbolic id `id`.
    fn resolve(&self, id: &SymbolicId) -> Option<EntityId> {
        self.state().symbolic.resolve(id)
    }

    /// The symbolic id of `entity`, if its type declares one.
    fn symbolic_id(&self, entity: EntityId) -> Option<&SymbolicId> {
        self.state().symbolic.symbolic_id(entity)
    }

    /// Entities whose soft-link fields reference `target`.
    fn referrers(&self, target: &SymbolicId) -> Vec<EntityId> {
        self.state().soft_links.holders(target)
    }

    /// Soft links currently held by `holder`.
    fn soft_links_of(&self, holder: EntityId) -> im::OrdSet<SoftLink> {
        self.state().soft_links.links_of(holder)
    }

    /// Live entities whose provenance matches `predicate`, in type then slot
    /// order.
    fn entities_by_source(&self, predicate: impl Fn(&EntitySource) -> bool) -> Vec<EntityId>
    where
        Self: Sized,
    {
        let state = self.state();
        state
            .records
            .all_ids()
            .filter(|id| {
                state
                    .records
                    .get(*id)
                    .is_ok_and(|data| predicate(data.source()))
            })
            .collect()
    }
}
