//! Entity records: the immutable payload stored for each entity.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use entigraph_foundation::{EntitySource, TypeTag, Value};

use crate::schema::EntitySchema;
use crate::soft_link::SoftLink;

/// Field values and provenance of one entity.
///
/// Records are values: a builder never mutates a record held by a snapshot,
/// it stores a modified copy. Cloning is O(1) because fields live in a
/// persistent map.
///
/// Records deliberately do not implement `PartialEq`. Use
/// [`equals_ignoring_source`](Self::equals_ignoring_source) for value
/// equality and [`equals_with_source`](Self::equals_with_source) when
/// provenance matters too.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityData {
    type_tag: TypeTag,
    fields: im::OrdMap<Arc<str>, Value>,
    source: EntitySource,
}

impl EntityData {
    /// Creates an empty record of the given type.
    #[must_use]
    pub fn new(type_tag: TypeTag, source: EntitySource) -> Self {
        Self {
            type_tag,
            fields: im::OrdMap::new(),
            source,
        }
    }

    /// Returns a copy with `field` set to `value`.
    #[must_use]
    pub fn with(mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field, returning the previous value.
    ///
    /// Setting a field to [`Value::Null`] removes it.
    pub fn set(&mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) -> Option<Value> {
        let field = field.into();
        match value.into() {
            Value::Null => self.fields.remove(&field),
            value => self.fields.insert(field, value),
        }
    }

    /// Gets a field value. Unset fields yield `None`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns true if the field holds a non-null value.
    #[must_use]
    pub fn is_initialized(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates over set fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.fields.iter()
    }

    /// The concrete type of the entity.
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    /// The provenance marker.
    #[must_use]
    pub fn source(&self) -> &EntitySource {
        &self.source
    }

    /// Replaces the provenance marker.
    pub fn set_source(&mut self, source: EntitySource) {
        self.source = source;
    }

    /// Value equality: same type and fields, provenance ignored.
    #[must_use]
    pub fn equals_ignoring_source(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag && self.fields == other.fields
    }

    /// Value-plus-provenance equality.
    #[must_use]
    pub fn equals_with_source(&self, other: &Self) -> bool {
        self.equals_ignoring_source(other) && self.source == other.source
    }

    /// Names of fields whose values differ between `self` and `other`.
    ///
    /// A field set on one side and unset on the other counts as differing.
    #[must_use]
    pub fn diff_fields(&self, other: &Self) -> Vec<Arc<str>> {
        let mut changed: Vec<Arc<str>> = self
            .fields
            .iter()
            .filter(|(name, value)| other.fields.get(&***name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            other
                .fields
                .keys()
                .filter(|name| !self.fields.contains_key(&***name))
                .cloned(),
        );
        changed.sort();
        changed
    }

    /// Collects the soft links held by this record's soft-link fields.
    #[must_use]
    pub fn soft_links(&self, schema: &EntitySchema) -> im::OrdSet<SoftLink> {
        let mut links = im::OrdSet::new();
        for field in schema.soft_link_fields() {
            if let Some(value) = self.fields.get(&*field.name) {
                value.for_each_symbolic(&mut |target| {
                    links.insert(SoftLink::new(field.name.clone(), target.clone()));
                });
            }
        }
        links
    }
}
