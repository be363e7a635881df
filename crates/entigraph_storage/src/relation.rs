//! Relation storage with bidirectional indices.
//!
//! Edges are grouped by connection. Each connection keeps both directions:
//! - Forward: parent -> ordered children
//! - Reverse: child -> parent
//!
//! A child has at most one parent per connection. Whether a parent may have
//! several children depends on the connection's cardinality.

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use entigraph_foundation::EntityId;
use tracing::trace;

use crate::schema::ConnectionId;

/// One parent/child edge of a connection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Edge {
    /// Connection the edge belongs to.
    pub connection: ConnectionId,
    /// Parent end.
    pub parent: EntityId,
    /// Child end.
    pub child: EntityId,
}

impl Edge {
    /// Creates an edge.
    #[must_use]
    pub fn new(connection: ConnectionId, parent: EntityId, child: EntityId) -> Self {
        Self {
            connection,
            parent,
            child,
        }
    }
}

/// Edges added and removed by one index operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationDelta {
    /// Edges that did not exist before.
    pub added: Vec<Edge>,
    /// Edges that no longer exist.
    pub removed: Vec<Edge>,
}

impl RelationDelta {
    /// Returns true if the operation changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Bucket {
    children: im::HashMap<EntityId, im::Vector<EntityId>>,
    parents: im::HashMap<EntityId, EntityId>,
}

impl Bucket {
    fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    fn detach(&mut self, parent: EntityId, child: EntityId) -> bool {
        if self.parents.get(&child) != Some(&parent) {
            return false;
        }
        self.parents.remove(&child);
        if let Some(list) = self.children.get_mut(&parent) {
            list.retain(|c| *c != child);
            if list.is_empty() {
                self.children.remove(&parent);
            }
        }
        true
    }

    fn attach(&mut self, parent: EntityId, child: EntityId) {
        self.parents.insert(child, parent);
        self.children.entry(parent).or_default().push_back(child);
    }
}

/// Stores relation edges between entities, grouped by connection.
///
/// Empty buckets and empty child lists are pruned, so two indices holding
/// the same edges compare equal.
#[derive(Clone, Debug, Default)]
pub struct RelationIndex {
    buckets: im::OrdMap<ConnectionId, Bucket>,
}

impl RelationIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, connection: &ConnectionId) -> &mut Bucket {
        self.buckets
            .entry(connection.clone())
            .or_insert_with(Bucket::default)
    }

    fn prune(&mut self, connection: &ConnectionId) {
        if self.buckets.get(connection).is_some_and(Bucket::is_empty) {
            self.buckets.remove(connection);
        }
    }

    /// Links `child` under `parent`.
    ///
    /// A child already under another parent is moved. In single-child
    /// connections the parent's previous child is detached first. Linking an
    /// existing edge is a no-op.
    pub fn link(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        child: EntityId,
    ) -> RelationDelta {
        let mut delta = RelationDelta::default();
        if self.parent(connection, child) == Some(parent) {
            return delta;
        }
        let many = connection.cardinality().is_many();
        let bucket = self.bucket_mut(connection);

        if let Some(old_parent) = bucket.parents.get(&child).copied() {
            bucket.detach(old_parent, child);
            delta.removed.push(Edge::new(connection.clone(), old_parent, child));
        }
        if !many {
            let previous = bucket.children.get(&parent).and_then(|list| list.head().copied());
            if let Some(old_child) = previous {
                bucket.detach(parent, old_child);
                delta.removed.push(Edge::new(connection.clone(), parent, old_child));
            }
        }
        bucket.attach(parent, child);
        delta.added.push(Edge::new(connection.clone(), parent, child));

        trace!(connection = connection.name(), ?parent, ?child, "linked");
        delta
    }

    /// Removes the edge between `parent` and `child`, if present.
    pub fn unlink(&mut self, connection: &ConnectionId, parent: EntityId, child: EntityId) -> bool {
        let Some(bucket) = self.buckets.get_mut(connection) else {
            return false;
        };
        let removed = bucket.detach(parent, child);
        if removed {
            trace!(connection = connection.name(), ?parent, ?child, "unlinked");
            self.prune(connection);
        }
        removed
    }

    /// Removes `child`'s parent edge, returning the former parent.
    pub fn unlink_child(&mut self, connection: &ConnectionId, child: EntityId) -> Option<EntityId> {
        let parent = self.parent(connection, child)?;
        self.unlink(connection, parent, child);
        Some(parent)
    }

    /// Replaces the ordered children of `parent` with exactly `children`.
    ///
    /// Children that are attached elsewhere are moved, children missing from
    /// the new list are detached. The caller checks for duplicates.
    pub fn replace_children(
        &mut self,
        connection: &ConnectionId,
        parent: EntityId,
        children: &[EntityId],
    ) -> RelationDelta {
        let mut delta = RelationDelta::default();
        let keep: HashSet<EntityId> = children.iter().copied().collect();

        for old in self.children(connection, parent) {
            if !keep.contains(&old) {
                self.unlink(connection, parent, old);
                delta.removed.push(Edge::new(connection.clone(), parent, old));
            }
        }
        for child in children {
            if self.parent(connection, *child) != Some(parent) {
                delta.merge(self.link(connection, parent, *child));
            }
        }

        if !children.is_empty() {
            let order: im::Vector<EntityId> = children.iter().copied().collect();
            self.bucket_mut(connection).children.insert(parent, order);
        }
        self.prune(connection);
        delta
    }

    /// Removes every edge in which `entity` is the parent or the child.
    pub fn remove_entity(&mut self, entity: EntityId) -> Vec<Edge> {
        let mut removed = self.parent_edges(entity);
        removed.extend(self.child_edges(entity));
        for edge in &removed {
            self.unlink(&edge.connection, edge.parent, edge.child);
        }
        removed
    }

    /// The parent of `child` in `connection`.
    #[must_use]
    pub fn parent(&self, connection: &ConnectionId, child: EntityId) -> Option<EntityId> {
        self.buckets
            .get(connection)
            .and_then(|b| b.parents.get(&child))
            .copied()
    }

    /// The ordered children of `parent` in `connection`.
    #[must_use]
    pub fn children(&self, connection: &ConnectionId, parent: EntityId) -> Vec<EntityId> {
        self.buckets
            .get(connection)
            .and_then(|b| b.children.get(&parent))
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Edges in which `child` is the child, across all connections.
    #[must_use]
    pub fn parent_edges(&self, child: EntityId) -> Vec<Edge> {
        self.buckets
            .iter()
            .filter_map(|(conn, b)| {
                b.parents
                    .get(&child)
                    .map(|parent| Edge::new(conn.clone(), *parent, child))
            })
            .collect()
    }

    /// Edges in which `parent` is the parent, across all connections.
    #[must_use]
    pub fn child_edges(&self, parent: EntityId) -> Vec<Edge> {
        self.buckets
            .iter()
            .flat_map(|(conn, b)| {
                b.children
                    .get(&parent)
                    .into_iter()
                    .flat_map(move |list| {
                        list.iter().map(move |c| Edge::new(conn.clone(), parent, *c))
                    })
            })
            .collect()
    }

    /// Returns true if `ancestor` is reachable from `entity` by following
    /// parent edges of any connection. An entity is its own ancestor.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: EntityId, entity: EntityId) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![entity];
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if seen.insert(current) {
                pending.extend(self.parent_edges(current).into_iter().map(|e| e.parent));
            }
        }
        false
    }

    /// Total number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.parents.len()).sum()
    }

    /// Returns true if there are no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns true if both indices hold the same edges with the same order.
    #[must_use]
    pub fn same_edges(&self, other: &Self) -> bool {
        self.buckets == other.buckets
    }
}
