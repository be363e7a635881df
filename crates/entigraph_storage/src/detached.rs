//! Entities built outside any builder and attached later.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use entigraph_foundation::{EntityId, Error, ErrorKind, Result};
use tracing::warn;

use crate::builder::{Builder, SessionToken};
use crate::record::EntityData;
use crate::schema::ConnectionId;
use crate::state::EntityStorage;

#[derive(Clone, Debug)]
struct Binding {
    session: Weak<SessionToken>,
    session_id: u64,
    id: EntityId,
}

/// An entity tree constructed independently of any store.
///
/// A detached entity carries its record, the existing entities it should be
/// linked under, and a tree of detached children. Applying it to a builder
/// stores the whole tree and binds every node to that builder's session.
///
/// A bound entity belongs to exactly one live session: applying it again to
/// the same builder returns the id it already has, applying it to another
/// live builder fails with `AlreadyAttached`. Once the session ends (the
/// builder committed or was dropped) the entity may be applied elsewhere.
#[derive(Clone, Debug)]
pub struct DetachedEntity {
    data: EntityData,
    parents: Vec<(ConnectionId, EntityId)>,
    children: Vec<(ConnectionId, DetachedEntity)>,
    binding: Option<Binding>,
}

impl DetachedEntity {
    /// Creates an unattached entity.
    #[must_use]
    pub fn new(data: EntityData) -> Self {
        Self {
            data,
            parents: Vec::new(),
            children: Vec::new(),
            binding: None,
        }
    }

    /// Links the entity under an existing `parent` once attached.
    #[must_use]
    pub fn with_parent(mut self, connection: ConnectionId, parent: EntityId) -> Self {
        self.parents.push((connection, parent));
        self
    }

    /// Adds a detached child, linked under this entity once attached.
    #[must_use]
    pub fn with_child(mut self, connection: ConnectionId, child: DetachedEntity) -> Self {
        self.children.push((connection, child));
        self
    }

    /// Copies an entity and, recursively, its children out of a store.
    ///
    /// The copy is unattached and has no parents. Children are visited once
    /// even if the graph reaches them twice.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` is not live in `storage`.
    pub fn copy_from(storage: &impl EntityStorage, id: EntityId) -> Result<Self> {
        Self::copy_tree(storage, id, &mut HashSet::new())
    }

    fn copy_tree(
        storage: &impl EntityStorage,
        id: EntityId,
        seen: &mut HashSet<EntityId>,
    ) -> Result<Self> {
        seen.insert(id);
        let mut copy = Self::new(storage.get(id)?.clone());
        let connections: Vec<ConnectionId> = storage
            .schema()
            .connections_as_parent(id.type_tag)
            .cloned()
            .collect();
        for connection in connections {
            for child in storage.children(&connection, id) {
                if !seen.contains(&child) {
                    let subtree = Self::copy_tree(storage, child, seen)?;
                    copy.children.push((connection.clone(), subtree));
                }
            }
        }
        Ok(copy)
    }

    /// The record to be stored.
    #[must_use]
    pub fn data(&self) -> &EntityData {
        &self.data
    }

    /// Mutable access to the record.
    ///
    /// Edits made after attaching do not reach the builder; use the builder's
    /// own write methods on [`attached_id`](Self::attached_id) instead.
    pub fn data_mut(&mut self) -> &mut EntityData {
        &mut self.data
    }

    /// Detached children with the connection each is linked through.
    pub fn children(&self) -> impl Iterator<Item = (&ConnectionId, &DetachedEntity)> {
        self.children.iter().map(|(c, e)| (c, e))
    }

    /// The id this entity was stored under, while its session is alive.
    #[must_use]
    pub fn attached_id(&self) -> Option<EntityId> {
        self.binding
            .as_ref()
            .filter(|b| b.session.strong_count() > 0)
            .map(|b| b.id)
    }

    /// Returns true if the entity is bound to a live builder session.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached_id().is_some()
    }

    /// Stores this entity tree in `builder` and returns the root's id.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyAttached` if the entity is bound to another live
    /// builder, `BuilderClosed` for committed builders, and any error a
    /// builder write raises. On error neither the builder nor the entity's
    /// binding changes.
    pub fn apply_to_builder(&mut self, builder: &mut Builder) -> Result<EntityId> {
        let Some(token) = builder.session_token().cloned() else {
            return Err(Error::new(ErrorKind::BuilderClosed));
        };

        if let Some(binding) = &self.binding {
            match binding.session.upgrade() {
                Some(live) if Arc::ptr_eq(&live, &token) => return Ok(binding.id),
                Some(live) => {
                    return Err(Error::new(ErrorKind::AlreadyAttached { session: live.id }));
                }
                None => {
                    warn!(
                        previous_session = binding.session_id,
                        session = token.id,
                        "rebinding detached entity whose session ended"
                    );
                }
            }
        }

        let ids = builder.atomically(|b| {
            let mut ids = Vec::new();
            self.insert_into(b, None, &mut ids)?;
            Ok(ids)
        })?;

        let root = ids.first().copied();
        self.bind(&token, &mut ids.into_iter());
        root.ok_or_else(|| Error::schema("detached entity produced no id"))
    }

    fn insert_into(
        &self,
        builder: &mut Builder,
        owner: Option<(&ConnectionId, EntityId)>,
        ids: &mut Vec<EntityId>,
    ) -> Result<()> {
        let type_name = builder.schema().type_name(self.data.type_tag()).to_owned();
        let frame = || format!("attaching {type_name}");

        let id = builder
            .insert_entity(self.data.clone())
            .map_err(|e| e.with_frame(frame()))?;
        ids.push(id);

        let parents = owner.into_iter().chain(self.parents.iter().map(|(c, p)| (c, *p)));
        for (connection, parent) in parents {
            builder
                .link_edge(connection, parent, id)
                .map_err(|e| e.with_frame(frame()))?;
        }
        for (connection, child) in &self.children {
            child.insert_into(builder, Some((connection, id)), ids)?;
        }
        Ok(())
    }

    fn bind(&mut self, token: &Arc<SessionToken>, ids: &mut impl Iterator<Item = EntityId>) {
        if let Some(id) = ids.next() {
            self.binding = Some(Binding {
                session: Arc::downgrade(token),
                session_id: token.id,
                id,
            });
        }
        for (_, child) in &mut self.children {
            child.bind(token, ids);
        }
    }
}
