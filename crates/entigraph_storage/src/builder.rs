//! Copy-on-write builders over snapshots.
//!
//! A [`Builder`] starts as an O(1) clone of its base snapshot's state and
//! records every write in a log. The base is never touched: writes copy
//! only the partitions and buckets they reach.
//!
//! Structural errors (unknown ids, wrong roles, cycles) fail the offending
//! call and leave the builder as it was before the call. Completeness errors
//! (unset required fields, missing required parents) are only checked by
//! [`Builder::commit`], so multi-step edits may pass through invalid states.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use entigraph_foundation::{CommitStrictness, EntityId, Error, ErrorKind, Result, SymbolicId, Value};
use tracing::{debug, warn};

use crate::change::{ChangeSet, WriteOp};
use crate::record::EntityData;
use crate::relation::{Edge, RelationDelta};
use crate::schema::ConnectionId;
use crate::snapshot::Snapshot;
use crate::state::{EntityStorage, StoreState};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identity of one builder session.
///
/// Detached entities keep a weak reference to the token of the builder they
/// were applied to; the token dies when the builder commits or is dropped.
#[derive(Debug)]
pub(crate) struct SessionToken {
    pub(crate) id: u64,
}

/// Result of a successful commit.
#[derive(Clone, Debug)]
pub struct Commit {
    /// The new snapshot.
    pub snapshot: Snapshot,
    /// What changed relative to the builder's base.
    pub changes: ChangeSet,
}

/// Mutable overlay over a base snapshot.
///
/// A builder is single-writer; share it across threads only behind external
/// synchronization.
#[derive(Debug)]
pub struct Builder {
    base: Snapshot,
    state: StoreState,
    log: Vec<WriteOp>,
    session: Option<Arc<SessionToken>>,
    session_id: u64,
}

impl Builder {
    pub(crate) fn new(base: Snapshot) -> Self {
        let session_id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        Self {
            state: base.state.clone(),
            base,
            log: Vec::new(),
            session: Some(Arc::new(SessionToken { id: session_id })),
            session_id,
        }
    }

    /// The snapshot this builder was derived from.
    #[must_use]
    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    /// Process-unique id of this builder session.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Returns true once [`commit`](Self::commit) succeeded.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.session.is_none()
    }

    pub(crate) fn session_token(&self) -> Option<&Arc<SessionToken>> {
        self.session.as_ref()
    }

    /// Every write since the builder was created, in order.
    #[must_use]
    pub fn write_log(&self) -> &[WriteOp] {
        &self.log
    }

    /// Returns true if committing now would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.net_changes().is_empty()
    }

    fn net_changes(&self) -> ChangeSet {
        ChangeSet::net(&self.log, &self.base.state, &self.state)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.session.is_some() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::BuilderClosed))
        }
    }

    /// Runs `op`, rolling state and log back if it fails.
    pub(crate) fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let saved = self.state.clone();
        let log_len = self.log.len();
        let result = op(self);
        if result.is_err() {
            self.state = saved;
            self.log.truncate(log_len);
        }
        result
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Stores a new entity and returns its id.
    ///
    /// Unset optional fields with a declared default are filled in. Required
    /// fields may stay unset until commit.
    ///
    /// # Errors
    ///
    /// Returns a schema error for unknown types or fields and `TypeMismatch`
    /// for values of the wrong type.
    pub fn add_entity(&mut self, data: EntityData) -> Result<EntityId> {
        self.atomically(|b| b.insert_entity(data))
    }

    /// Sets one field of an entity. Setting [`Value::Null`] unsets it.
    ///
    /// Returns true if the stored value changed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for stale ids, a schema error for unknown fields,
    /// and `TypeMismatch` for values of the wrong type.
    pub fn set_field(
        &mut self,
        id: EntityId,
        field: impl Into<Arc<str>>,
        value: impl Into<Value>,
    ) -> Result<bool> {
        let field = field.into();
        let value = value.into();
        self.atomically(|b| {
            let mut data = b.state.records.get(id)?.clone();
            b.state.schema.check_field(id.type_tag, &field, &value)?;
            data.set(field, value);
            b.store_record(id, data).map(|changed| !changed.is_empty())
        })
    }

    /// Edits an entity's record in place and returns the changed fields.
    ///
    /// # Errors
    ///
    /// As [`set_field`](Self::set_field), for every field the edit touches.
    pub fn modify(
        &mut self,
        id: EntityId,
        edit: impl FnOnce(&mut EntityData),
    ) -> Result<Vec<Arc<str>>> {
        self.atomically(|b| {
            let mut data = b.state.records.get(id)?.clone();
            edit(&mut data);
            b.store_record(id, data)
        })
    }

    /// Replaces an entity's record wholesale and returns the changed fields.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if `data` is of another type, plus the errors
    /// of [`set_field`](Self::set_field).
    pub fn replace_data(&mut self, id: EntityId, data: EntityData) -> Result<Vec<Arc<str>>> {
        self.atomically(|b| b.store_record(id, data))
    }

    /// Removes an entity and every edge it takes part in.
    ///
    /// With cascade removal enabled, children held through non-nullable
    /// connections are removed first. Returns every removed id, children
    /// before parents.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for stale ids.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Vec<EntityId>> {
        self.atomically(|b| {
            let mut removed = Vec::new();
            b.remove_cascading(id, &mut HashSet::new(), &mut removed)?;
            Ok(removed)
        })
    }

    fn validate_fields(&self, data: &EntityData) -> Result<()> {
        for (name, value) in data.fields() {
            self.state.schema.check_field(data.type_tag(), name, value)?;
        }
        Ok(())
    }

    pub(crate) fn insert_entity(&mut self, mut data: EntityData) -> Result<EntityId> {
        let schema = Arc::clone(&self.state.schema);
        let entity = schema.entity(data.type_tag())?;
        self.validate_fields(&data)?;
        for field in &entity.fields {
            if let Some(default) = &field.default {
                if !data.is_initialized(&field.name) {
                    data.set(field.name.clone(), default.clone());
                }
            }
        }

        let links = data.soft_links(entity);
        let symbolic = schema.symbolic_id_of(&data);
        let id = self.state.records.allocate(data.type_tag())?;
        self.state.records.put(id, data)?;
        for link in links {
            self.state.soft_links.index(id, link.field, link.target);
        }
        self.state.symbolic.set(id, symbolic);
        self.log.push(WriteOp::EntityAdded(id));
        Ok(id)
    }

    fn store_record(&mut self, id: EntityId, data: EntityData) -> Result<Vec<Arc<str>>> {
        let previous = self.state.records.get(id)?.clone();
        if data.type_tag() != id.type_tag {
            return Err(Error::type_mismatch(
                format!("type {}", self.state.schema.type_name(id.type_tag)),
                format!("type {}", self.state.schema.type_name(data.type_tag())),
            ));
        }
        self.validate_fields(&data)?;

        let changed = previous.diff_fields(&data);
        if changed.is_empty() && previous.source() == data.source() {
            return Ok(changed);
        }

        let schema = Arc::clone(&self.state.schema);
        let entity = schema.entity(id.type_tag)?;
        let before = previous.soft_links(entity);
        let after = data.soft_links(entity);
        let symbolic = schema.symbolic_id_of(&data);
        self.state.records.put(id, data)?;
        self.state.soft_links.update_links_index(id, &before, &after);
        self.state.symbolic.set(id, symbolic);
        self.log.push(WriteOp::FieldsChanged {
            id,
            fields: changed.clone(),
        });
        Ok(changed)
    }

    fn remove_cascading(
        &mut self,
        id: EntityId,
        visiting: &mut HashSet<EntityId>,
        removed: &mut Vec<EntityId>,
    ) -> Result<()> {
        self.state.records.get(id)?;
        visiting.insert(id);

        if self.state.config.cascade_removal {
            for edge in self.state.relations.child_edges(id) {
                if !edge.connection.is_child_nullable()
                    && !visiting.contains(&edge.child)
                    && self.state.records.contains(edge.child)
                {
                    self.remove_cascading(edge.child, visiting, removed)?;
                }
            }
        }

        for edge in self.state.relations.remove_entity(id) {
            self.log.push(WriteOp::EdgeRemoved(edge));
        }
        self.state.soft_links.remove_holder(id);
        self.state.symbolic.set(id, None);
        self.state.records.free(id)?;
        self.log.push(WriteOp::EntityRemoved(id));
        removed.push(id);
        Ok(())
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Sets or clears the parent of `child` in `connection`.
    ///
    /// A previous parent is detached. In single-child connections the new
    /// parent's previous child is detached too, and removed if the
    /// connection is non-nullable.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for stale ids, a schema error for unknown
    /// connections, `TypeMismatch` if an entity cannot fill its role, and
    /// `Consistency` if the edge would close a cycle.
    pub fn set_parent(
        &mut self,
        connection: &ConnectionId,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<()> {
        self.atomically(|b| match parent {
            Some(parent) => b.link_edge(connection, parent, child),
            None => {
                b.check_connection(connection)?;
                b.state.records.get(child)?;
                if let Some(old) = b.state.relations.unlink_child(connection, child) {
                    b.log
                        .push(WriteOp::EdgeRemoved(Edge::new(connection.clone(), old, child)));
                }
                Ok(())
            }
        })
    }

    /// Sets or clears the child of `parent` in a single-child connection.
    ///
    /// The previous child is detached, and removed if the connection is
    /// non-nullable.
    ///
    /// # Errors
    ///
    /// As [`set_parent`](Self::set_parent), plus a schema error if the
    /// connection holds several children per parent.
    pub fn set_child(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        child: Option<EntityId>,
    ) -> Result<()> {
        self.atomically(|b| {
            b.check_connection(connection)?;
            if connection.cardinality().is_many() {
                return Err(Error::schema(format!(
                    "{connection:?} holds several children per parent"
                )));
            }
            b.assign_child(connection, parent, child)
        })
    }

    /// Appends `child` to `parent`'s children, moving it from any previous
    /// parent.
    ///
    /// # Errors
    ///
    /// As [`set_parent`](Self::set_parent).
    pub fn add_child(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        child: EntityId,
    ) -> Result<()> {
        self.atomically(|b| b.link_edge(connection, parent, child))
    }

    /// Replaces the children of `parent` with exactly `children`, in the
    /// given order.
    ///
    /// Children missing from the new list are removed if the connection is
    /// non-nullable, and detached otherwise. Single-child connections accept
    /// lists of at most one entity.
    ///
    /// # Errors
    ///
    /// As [`set_parent`](Self::set_parent), plus `Consistency` if an entity
    /// is listed twice or a single-child connection is given several.
    pub fn replace_children(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        children: &[EntityId],
    ) -> Result<()> {
        self.atomically(|b| {
            b.check_connection(connection)?;
            if !connection.cardinality().is_many() {
                return match children {
                    [] => b.assign_child(connection, parent, None),
                    [child] => b.assign_child(connection, parent, Some(*child)),
                    _ => Err(Error::consistency(
                        b.state.schema.type_name(parent.type_tag),
                        connection.name(),
                        "single-child connection given several children",
                    )),
                };
            }
            b.replace_many(connection, parent, children)
        })
    }

    fn check_connection(&self, connection: &ConnectionId) -> Result<()> {
        if self.state.schema.has_connection(connection) {
            Ok(())
        } else {
            Err(Error::schema(format!("unknown connection {connection:?}")))
        }
    }

    fn check_edge(
        &self,
        connection: &ConnectionId,
        parent: EntityId,
        child: EntityId,
    ) -> Result<()> {
        self.check_connection(connection)?;
        self.state.records.get(parent)?;
        self.state.records.get(child)?;
        let schema = &self.state.schema;
        schema.check_role(connection.parent(), parent.type_tag)?;
        schema.check_role(connection.child(), child.type_tag)?;
        if self.state.config.detect_cycles && self.state.relations.is_ancestor(child, parent) {
            return Err(Error::consistency(
                schema.type_name(child.type_tag),
                connection.name(),
                format!("linking {child} under {parent} would create a cycle"),
            ));
        }
        Ok(())
    }

    fn log_delta(&mut self, delta: RelationDelta) {
        self.log.extend(delta.removed.into_iter().map(WriteOp::EdgeRemoved));
        self.log.extend(delta.added.into_iter().map(WriteOp::EdgeAdded));
    }

    fn remove_orphans(&mut self, connection: &ConnectionId, orphans: Vec<EntityId>) -> Result<()> {
        if connection.is_child_nullable() {
            return Ok(());
        }
        for orphan in orphans {
            if self.state.records.contains(orphan) {
                self.remove_cascading(orphan, &mut HashSet::new(), &mut Vec::new())?;
            }
        }
        Ok(())
    }

    pub(crate) fn link_edge(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        child: EntityId,
    ) -> Result<()> {
        self.check_edge(connection, parent, child)?;

        if let Some(old) = self
            .state
            .relations
            .parent(connection, child)
            .filter(|old| *old != parent)
        {
            if connection.cardinality().is_many() {
                warn!(
                    connection = connection.name(),
                    %child,
                    from = %old,
                    to = %parent,
                    "moved child to another parent"
                );
            } else {
                debug!(
                    connection = connection.name(),
                    %child,
                    from = %old,
                    to = %parent,
                    "reassigned one-to-one parent"
                );
            }
        }

        let delta = self.state.relations.link(connection, parent, child);
        let displaced: Vec<EntityId> = if connection.cardinality().is_many() {
            Vec::new()
        } else {
            delta
                .removed
                .iter()
                .filter(|e| e.parent == parent && e.child != child)
                .map(|e| e.child)
                .collect()
        };
        self.log_delta(delta);
        self.remove_orphans(connection, displaced)
    }

    fn assign_child(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        child: Option<EntityId>,
    ) -> Result<()> {
        if let Some(child) = child {
            return self.link_edge(connection, parent, child);
        }
        self.state.records.get(parent)?;
        let previous = self.state.relations.children(connection, parent);
        for old in &previous {
            self.state.relations.unlink(connection, parent, *old);
            self.log
                .push(WriteOp::EdgeRemoved(Edge::new(connection.clone(), parent, *old)));
        }
        self.remove_orphans(connection, previous)
    }

    fn replace_many(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        children: &[EntityId],
    ) -> Result<()> {
        self.state.records.get(parent)?;
        let mut listed = HashSet::new();
        for child in children {
            if !listed.insert(*child) {
                return Err(Error::consistency(
                    self.state.schema.type_name(parent.type_tag),
                    connection.name(),
                    format!("{child} listed twice"),
                ));
            }
            self.check_edge(connection, parent, *child)?;
            if let Some(old) = self
                .state
                .relations
                .parent(connection, *child)
                .filter(|old| *old != parent)
            {
                warn!(
                    connection = connection.name(),
                    %child,
                    from = %old,
                    to = %parent,
                    "moved child to another parent"
                );
            }
        }

        let before = self.state.relations.children(connection, parent);
        let delta = self
            .state
            .relations
            .replace_children(connection, parent, children);

        let kept_before: Vec<EntityId> = before
            .iter()
            .copied()
            .filter(|c| listed.contains(c))
            .collect();
        let kept_after: Vec<EntityId> = children
            .iter()
            .copied()
            .filter(|c| before.contains(c))
            .collect();
        let dropped: Vec<EntityId> = before
            .iter()
            .copied()
            .filter(|c| !listed.contains(c))
            .collect();

        self.log_delta(delta);
        if kept_before != kept_after {
            self.log.push(WriteOp::ChildrenReordered {
                connection: connection.clone(),
                parent,
            });
        }
        self.remove_orphans(connection, dropped)
    }

    // =========================================================================
    // Soft links
    // =========================================================================

    /// Rewrites every indexed reference to `from` into `to`.
    ///
    /// Only soft-link fields that hold `from` are touched; every other field
    /// of every holder keeps its value. Returns true if at least one holder
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns `BuilderClosed` on a committed builder.
    pub fn update_link(&mut self, from: &SymbolicId, to: &SymbolicId) -> Result<bool> {
        self.atomically(|b| {
            if from == to {
                return Ok(false);
            }
            let mut rewritten = Vec::new();
            for holder in b.state.soft_links.holders(from) {
                let fields: Vec<Arc<str>> = b
                    .state
                    .soft_links
                    .links_of(holder)
                    .iter()
                    .filter(|link| &link.target == from)
                    .map(|link| link.field.clone())
                    .collect();

                let mut data = b.state.records.get(holder)?.clone();
                let mut touched = false;
                for field in fields {
                    if let Some(value) = data.get(&field).and_then(|v| v.replace_symbolic(from, to)) {
                        data.set(field, value);
                        touched = true;
                    }
                }
                if touched {
                    b.store_record(holder, data)?;
                    rewritten.push(holder);
                }
            }

            if rewritten.is_empty() {
                return Ok(false);
            }
            debug!(%from, %to, holders = rewritten.len(), "renamed soft link");
            b.log.push(WriteOp::LinkRenamed {
                from: from.clone(),
                to: to.clone(),
                holders: rewritten,
            });
            Ok(true)
        })
    }

    /// Copies every differing field and the provenance of `source` into
    /// `target`, then links `target` under each of `parents`.
    ///
    /// Returns the fields that changed; unchanged fields are not marked
    /// dirty.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if `source` is of another type, plus the
    /// errors of [`set_parent`](Self::set_parent) for each parent.
    pub fn relabel(
        &mut self,
        target: EntityId,
        source: &EntityData,
        parents: &[(ConnectionId, EntityId)],
    ) -> Result<Vec<Arc<str>>> {
        self.atomically(|b| {
            let mut data = b.state.records.get(target)?.clone();
            if source.type_tag() != target.type_tag {
                return Err(Error::type_mismatch(
                    format!("type {}", b.state.schema.type_name(target.type_tag)),
                    format!("type {}", b.state.schema.type_name(source.type_tag())),
                ));
            }
            for field in data.diff_fields(source) {
                let value = source.get(&field).cloned().unwrap_or_default();
                data.set(field, value);
            }
            data.set_source(source.source().clone());
            let changed = b.store_record(target, data)?;

            for (connection, parent) in parents {
                b.link_edge(connection, *parent, target)?;
            }
            Ok(changed)
        })
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Verifies that `id` could be committed as it stands.
    ///
    /// # Errors
    ///
    /// Returns `UninitializedField` naming the first unset required field,
    /// or `Consistency` naming the first non-nullable connection without a
    /// parent.
    pub fn check_initialization(&self, id: EntityId) -> Result<()> {
        self.state.check_initialization(id)
    }

    /// Folds this builder into a new snapshot.
    ///
    /// Every created or mutated entity, and the child end of every changed
    /// edge, is checked with [`check_initialization`](Self::check_initialization)
    /// and for symbolic id uniqueness. What happens on a violation depends
    /// on the store's [`CommitStrictness`]:
    /// - `RejectSession`: the first violation is returned and the builder is
    ///   left as it was, so it can be repaired and committed again.
    /// - `DropViolating`: violating entities are removed (with their
    ///   cascade) from the new snapshot and listed in
    ///   [`ChangeSet::rejected`].
    ///
    /// The version is bumped only if something changed.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCommit` if the builder was committed already, or
    /// the first violation under `RejectSession`.
    pub fn commit(&mut self) -> Result<Commit> {
        if self.session.is_none() {
            return Err(Error::new(ErrorKind::DuplicateCommit));
        }

        let (state, changes) = match self.state.config.strictness {
            CommitStrictness::RejectSession => {
                let changes = self.net_changes();
                if let Some((id, err)) = self.state.first_violation(&changes) {
                    let type_name = self.state.schema.type_name(id.type_tag);
                    let frame = format!("committing {type_name} {id}");
                    return Err(err.with_frame(frame));
                }
                (self.state.clone(), changes)
            }
            CommitStrictness::DropViolating => self.drop_violating()?,
        };

        let version = if changes.is_empty() {
            self.base.version()
        } else {
            self.base.version() + 1
        };
        debug!(
            session = self.session_id,
            version,
            created = changes.created.len(),
            removed = changes.removed.len(),
            mutated = changes.mutated.len(),
            added_edges = changes.added_edges.len(),
            removed_edges = changes.removed_edges.len(),
            rejected = changes.rejected.len(),
            "committed builder"
        );

        self.session = None;
        let snapshot = if changes.is_empty() {
            self.base.clone()
        } else {
            Snapshot::from_state(state, version)
        };
        Ok(Commit { snapshot, changes })
    }

    fn drop_violating(&self) -> Result<(StoreState, ChangeSet)> {
        let mut scratch = Self {
            base: self.base.clone(),
            state: self.state.clone(),
            log: self.log.clone(),
            session: None,
            session_id: self.session_id,
        };
        let mut rejected = Vec::new();

        loop {
            let changes = scratch.net_changes();
            let Some((id, err)) = scratch.state.first_violation(&changes) else {
                break;
            };
            warn!(entity = %id, error = %err, "dropping entity that failed commit checks");
            let mut removed = Vec::new();
            scratch.remove_cascading(id, &mut HashSet::new(), &mut removed)?;
            rejected.push((id, err.kind));
        }

        let mut changes = scratch.net_changes();
        changes.rejected = rejected;
        Ok((scratch.state, changes))
    }
}

impl EntityStorage for Builder {
    fn state(&self) -> &StoreState {
        &self.state
    }
}
