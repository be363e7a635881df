//! Change sets produced by commits.
//!
//! A builder records every write in its log. On commit the log is folded
//! into a [`ChangeSet`]: operations that undo each other within one session
//! cancel out, and the result is then compared with the base snapshot so
//! that records and child lists which ended where they started are dropped.
//! Observers only see the net difference between the base snapshot and the
//! new one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use entigraph_foundation::{EntityId, ErrorKind, SymbolicId};

use crate::relation::Edge;
use crate::schema::ConnectionId;
use crate::state::StoreState;

/// One entry of a builder's write log.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// A new entity was stored.
    EntityAdded(EntityId),
    /// An entity was removed.
    EntityRemoved(EntityId),
    /// Fields of an existing entity changed. An empty list means only the
    /// provenance changed.
    FieldsChanged {
        /// Entity whose record was replaced.
        id: EntityId,
        /// Names of the fields that differ from the previous record.
        fields: Vec<Arc<str>>,
    },
    /// An edge was created.
    EdgeAdded(Edge),
    /// An edge was removed.
    EdgeRemoved(Edge),
    /// The children of a parent were reordered without edges changing.
    ChildrenReordered {
        /// Connection of the reordered list.
        connection: ConnectionId,
        /// Parent owning the list.
        parent: EntityId,
    },
    /// A symbolic id was renamed in every soft-link holder.
    LinkRenamed {
        /// Previous symbolic id.
        from: SymbolicId,
        /// New symbolic id.
        to: SymbolicId,
        /// Holders whose fields were rewritten.
        holders: Vec<EntityId>,
    },
}

/// Entity-level event, as delivered to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Entity no longer exists.
    Removed(EntityId),
    /// Entity exists in both snapshots with different fields or provenance.
    Mutated(EntityId),
    /// Entity did not exist in the base snapshot.
    Added(EntityId),
}

/// Net difference between a base snapshot and the snapshot a commit
/// produced.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    /// Entities that did not exist in the base snapshot.
    pub created: BTreeSet<EntityId>,
    /// Base entities that no longer exist.
    pub removed: BTreeSet<EntityId>,
    /// Base entities whose records changed, with the changed field names.
    pub mutated: BTreeMap<EntityId, BTreeSet<Arc<str>>>,
    /// Edges that did not exist in the base snapshot.
    pub added_edges: BTreeSet<Edge>,
    /// Base edges that no longer exist.
    pub removed_edges: BTreeSet<Edge>,
    /// Child lists whose order changed while their membership did not.
    pub reordered: BTreeSet<(ConnectionId, EntityId)>,
    /// Symbolic id renames pushed through the soft-link index, in order.
    pub renamed_links: Vec<(SymbolicId, SymbolicId)>,
    /// Entities left out of the snapshot by a lenient commit, with the
    /// violation that excluded each.
    pub rejected: Vec<(EntityId, ErrorKind)>,
}

impl ChangeSet {
    /// Folds a write log into its net effect.
    #[must_use]
    pub fn from_log(log: &[WriteOp]) -> Self {
        let mut changes = Self::default();
        for op in log {
            changes.apply(op);
        }
        changes
    }

    /// Folds a write log and drops whatever `current` has back at its `base`
    /// value: records equal to the base record (provenance included), and
    /// child lists in their base order. Field names of a surviving mutation
    /// are recomputed against the base record.
    #[must_use]
    pub fn net(log: &[WriteOp], base: &StoreState, current: &StoreState) -> Self {
        let mut changes = Self::from_log(log);
        changes.mutated.retain(|id, fields| {
            match (base.records.get(*id), current.records.get(*id)) {
                (Ok(before), Ok(after)) if before.equals_with_source(after) => false,
                (Ok(before), Ok(after)) => {
                    *fields = before.diff_fields(after).into_iter().collect();
                    true
                }
                _ => true,
            }
        });
        changes.reordered.retain(|(connection, parent)| {
            base.relations.children(connection, *parent)
                != current.relations.children(connection, *parent)
        });
        // A rename that still matters left some holder created or mutated
        let entities_changed = !changes.created.is_empty()
            || !changes.removed.is_empty()
            || !changes.mutated.is_empty();
        if !entities_changed {
            changes.renamed_links.clear();
        }
        changes
    }

    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::EntityAdded(id) => {
                self.created.insert(*id);
            }
            WriteOp::EntityRemoved(id) => {
                self.mutated.remove(id);
                if !self.created.remove(id) {
                    self.removed.insert(*id);
                }
            }
            WriteOp::FieldsChanged { id, fields } => {
                if !self.created.contains(id) {
                    self.mutated
                        .entry(*id)
                        .or_default()
                        .extend(fields.iter().cloned());
                }
            }
            WriteOp::EdgeAdded(edge) => {
                if !self.removed_edges.remove(edge) {
                    self.added_edges.insert(edge.clone());
                }
            }
            WriteOp::EdgeRemoved(edge) => {
                if !self.added_edges.remove(edge) {
                    self.removed_edges.insert(edge.clone());
                }
            }
            WriteOp::ChildrenReordered { connection, parent } => {
                self.reordered.insert((connection.clone(), *parent));
            }
            WriteOp::LinkRenamed { from, to, .. } => {
                self.renamed_links.push((from.clone(), to.clone()));
            }
        }
    }

    /// Returns true if the commit changed nothing.
    ///
    /// Rejections alone do not count as changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.removed.is_empty()
            && self.mutated.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.reordered.is_empty()
            && self.renamed_links.is_empty()
    }

    /// Entity events ordered removals first, then mutations, then additions.
    ///
    /// Observers that maintain caches keyed by symbolic id can apply the
    /// events in this order without seeing a transient duplicate.
    #[must_use]
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.removed
            .iter()
            .map(|id| ChangeEvent::Removed(*id))
            .chain(self.mutated.keys().map(|id| ChangeEvent::Mutated(*id)))
            .chain(self.created.iter().map(|id| ChangeEvent::Added(*id)))
            .collect()
    }

    /// Entities whose consistency a commit must re-check: created and
    /// mutated entities, plus the child end of every changed edge.
    pub(crate) fn touched(&self) -> BTreeSet<EntityId> {
        let mut touched: BTreeSet<EntityId> = self.created.iter().copied().collect();
        touched.extend(self.mutated.keys().copied());
        touched.extend(self.added_edges.iter().map(|e| e.child));
        touched.extend(self.removed_edges.iter().map(|e| e.child));
        touched
    }
}
