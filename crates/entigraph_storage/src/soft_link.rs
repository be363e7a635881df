//! Symbolic id ownership and the soft-link reverse index.
//!
//! Two indices live here:
//! - [`SymbolicIndex`]: symbolic id -> owning entity, for `resolve`.
//! - [`SoftLinkIndex`]: symbolic id -> entities whose fields reference it,
//!   so renames can be propagated without structural edges.

use std::sync::Arc;

use entigraph_foundation::{EntityId, SymbolicId};

/// One soft reference: `field` of some holder stores `target`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoftLink {
    /// Field of the holder that stores the reference.
    pub field: Arc<str>,
    /// Referenced symbolic id.
    pub target: SymbolicId,
}

impl SoftLink {
    /// Creates a soft link descriptor.
    #[must_use]
    pub fn new(field: impl Into<Arc<str>>, target: SymbolicId) -> Self {
        Self {
            field: field.into(),
            target,
        }
    }
}

/// Reverse index of soft links.
///
/// Maintains both directions:
/// - target -> set of `(holder, field)`
/// - holder -> set of [`SoftLink`]
///
/// Entries are sets, so a holder that references the same target twice in
/// one field is indexed once for that field.
#[derive(Clone, Debug, Default)]
pub struct SoftLinkIndex {
    by_target: im::HashMap<SymbolicId, im::OrdSet<(EntityId, Arc<str>)>>,
    by_holder: im::HashMap<EntityId, im::OrdSet<SoftLink>>,
}

impl SoftLinkIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers that `field` of `holder` references `target`.
    ///
    /// Indexing an existing entry is a no-op.
    pub fn index(&mut self, holder: EntityId, field: impl Into<Arc<str>>, target: SymbolicId) {
        let field = field.into();
        let mut holders = self.by_target.get(&target).cloned().unwrap_or_default();
        holders.insert((holder, field.clone()));
        self.by_target.insert(target.clone(), holders);

        let mut links = self.by_holder.get(&holder).cloned().unwrap_or_default();
        links.insert(SoftLink::new(field, target));
        self.by_holder.insert(holder, links);
    }

    /// Unregisters every reference from `holder` to `target`, in any field.
    pub fn remove(&mut self, holder: EntityId, target: &SymbolicId) {
        let Some(links) = self.by_holder.get(&holder) else {
            return;
        };
        let doomed: Vec<SoftLink> = links.iter().filter(|l| &l.target == target).cloned().collect();
        for link in doomed {
            self.remove_link(holder, &link);
        }
    }

    /// Unregisters a single `(holder, field, target)` entry.
    pub fn remove_link(&mut self, holder: EntityId, link: &SoftLink) {
        if let Some(holders) = self.by_target.get(&link.target) {
            let mut holders = holders.clone();
            holders.remove(&(holder, link.field.clone()));
            if holders.is_empty() {
                self.by_target.remove(&link.target);
            } else {
                self.by_target.insert(link.target.clone(), holders);
            }
        }
        if let Some(links) = self.by_holder.get(&holder) {
            let mut links = links.clone();
            links.remove(link);
            if links.is_empty() {
                self.by_holder.remove(&holder);
            } else {
                self.by_holder.insert(holder, links);
            }
        }
    }

    /// Unregisters every reference held by `holder`.
    pub fn remove_holder(&mut self, holder: EntityId) {
        let links = self.links_of(holder);
        for link in &links {
            self.remove_link(holder, link);
        }
    }

    /// Reconciles the index with a holder's new soft-link set.
    ///
    /// Entries in `previous` but not in `current` are removed, entries new in
    /// `current` are added, and entries present in both are left alone.
    pub fn update_links_index(
        &mut self,
        holder: EntityId,
        previous: &im::OrdSet<SoftLink>,
        current: &im::OrdSet<SoftLink>,
    ) {
        for link in previous.iter().filter(|l| !current.contains(*l)) {
            self.remove_link(holder, link);
        }
        for link in current.iter().filter(|l| !previous.contains(*l)) {
            self.index(holder, link.field.clone(), link.target.clone());
        }
    }

    /// Entities whose fields reference `target`, each listed once, in id order.
    #[must_use]
    pub fn holders(&self, target: &SymbolicId) -> Vec<EntityId> {
        let mut holders: Vec<EntityId> = self
            .by_target
            .get(target)
            .map(|set| set.iter().map(|(holder, _)| *holder).collect())
            .unwrap_or_default();
        holders.dedup();
        holders
    }

    /// The soft links currently indexed for `holder`.
    #[must_use]
    pub fn links_of(&self, holder: EntityId) -> im::OrdSet<SoftLink> {
        self.by_holder.get(&holder).cloned().unwrap_or_default()
    }

    /// Number of `(holder, field, target)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_holder.values().map(im::OrdSet::len).sum()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_holder.is_empty()
    }

    /// Returns true if both indices hold the same entries.
    #[must_use]
    pub fn same_entries(&self, other: &Self) -> bool {
        self.by_holder == other.by_holder
    }
}

/// Index of symbolic id owners.
///
/// A symbolic id may transiently have several owners inside a builder; the
/// commit step decides whether that is allowed.
#[derive(Clone, Debug, Default)]
pub struct SymbolicIndex {
    owners: im::HashMap<SymbolicId, im::OrdSet<EntityId>>,
    by_entity: im::HashMap<EntityId, SymbolicId>,
}

impl SymbolicIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entity`'s current symbolic id, replacing any previous one.
    pub fn set(&mut self, entity: EntityId, id: Option<SymbolicId>) {
        if let Some(previous) = self.by_entity.remove(&entity) {
            if let Some(owners) = self.owners.get(&previous) {
                let mut owners = owners.clone();
                owners.remove(&entity);
                if owners.is_empty() {
                    self.owners.remove(&previous);
                } else {
                    self.owners.insert(previous, owners);
                }
            }
        }
        if let Some(id) = id {
            let mut owners = self.owners.get(&id).cloned().unwrap_or_default();
            owners.insert(entity);
            self.owners.insert(id.clone(), owners);
            self.by_entity.insert(entity, id);
        }
    }

    /// The lowest-id owner of `id`.
    #[must_use]
    pub fn resolve(&self, id: &SymbolicId) -> Option<EntityId> {
        self.owners.get(id).and_then(|owners| owners.get_min().copied())
    }

    /// Every entity that currently claims `id`.
    #[must_use]
    pub fn owners(&self, id: &SymbolicId) -> Vec<EntityId> {
        self.owners
            .get(id)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The symbolic id recorded for `entity`.
    #[must_use]
    pub fn symbolic_id(&self, entity: EntityId) -> Option<&SymbolicId> {
        self.by_entity.get(&entity)
    }

    /// Returns true if both indices hold the same entries.
    #[must_use]
    pub fn same_entries(&self, other: &Self) -> bool {
        self.by_entity == other.by_entity
    }
}
