//! Schema definitions for entity types and the connections between them.
//!
//! The schema is supplied once, when a store is created, and is shared by
//! every snapshot and builder derived from that store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use entigraph_foundation::{Capability, Error, FieldType, Result, SymbolicId, TypeTag, Value};

use crate::record::EntityData;

/// Schema definition for a field of an entity type.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    /// Field name.
    pub name: Arc<str>,
    /// Field type.
    pub ty: FieldType,
    /// Value written when a new entity leaves the field unset.
    pub default: Option<Value>,
    /// Whether the field must be initialized before commit.
    pub required: bool,
}

impl FieldSchema {
    /// Creates a required field with no default.
    #[must_use]
    pub fn required(name: impl Into<Arc<str>>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            required: true,
        }
    }

    /// Creates an optional field with a default value.
    #[must_use]
    pub fn optional(name: impl Into<Arc<str>>, ty: FieldType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
            required: false,
        }
    }

    /// Creates an optional field with no default (will be null).
    #[must_use]
    pub fn optional_none(name: impl Into<Arc<str>>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            required: false,
        }
    }
}

/// Schema definition for a concrete entity type.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySchema {
    /// Type name (e.g., `Module`, `ContentRoot`).
    pub name: Arc<str>,
    /// Field definitions.
    pub fields: Vec<FieldSchema>,
    /// Capabilities this type implements, for abstract relation roles.
    pub capabilities: Vec<Capability>,
    /// Field whose string value is the entity's symbolic id, if any.
    pub symbolic_field: Option<Arc<str>>,
}

impl EntitySchema {
    /// Creates a new entity schema.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            capabilities: Vec::new(),
            symbolic_field: None,
        }
    }

    /// Adds a field to the schema.
    #[must_use]
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Names the field that holds the entity's symbolic id.
    #[must_use]
    pub fn with_symbolic_id(mut self, field: impl Into<Arc<str>>) -> Self {
        self.symbolic_field = Some(field.into());
        self
    }

    /// Returns the field schema by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    /// Returns true if this type declares `capability`.
    #[must_use]
    pub fn implements(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Iterates over fields that can hold symbolic ids.
    pub fn soft_link_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.ty.is_soft_link())
    }
}

/// One side of a connection: a concrete type or any type with a capability.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Role {
    /// Exactly this entity type.
    Concrete(TypeTag),
    /// Any entity type that declares this capability.
    Abstract(Capability),
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete(tag) => write!(f, "{tag:?}"),
            Self::Abstract(cap) => write!(f, "{cap:?}"),
        }
    }
}

/// Cardinality of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cardinality {
    /// Parent has at most one child, child has at most one parent.
    OneToOne,
    /// Parent has an ordered list of children, child has at most one parent.
    OneToMany,
    /// Like `OneToOne`, with the child role typed by capability.
    OneToAbstractOne,
    /// Like `OneToMany`, with the child role typed by capability.
    OneToAbstractMany,
}

impl Cardinality {
    /// Returns true if a parent may hold several children.
    #[must_use]
    pub const fn is_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::OneToAbstractMany)
    }

    /// Returns true if the child role is typed by capability.
    #[must_use]
    pub const fn is_abstract(self) -> bool {
        matches!(self, Self::OneToAbstractOne | Self::OneToAbstractMany)
    }
}

/// Descriptor of one relation slot between two type roles.
///
/// Connection ids are compared structurally: two descriptors with the same
/// name, roles, cardinality, and optionality are the same connection.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionId {
    name: Arc<str>,
    parent: Role,
    child: Role,
    cardinality: Cardinality,
    child_nullable: bool,
}

impl ConnectionId {
    /// Creates a connection descriptor.
    ///
    /// `name` is the relation field as seen from the child (e.g. `module`
    /// for a content root's owning module). `child_nullable` says whether a
    /// child may exist without a parent in this connection.
    #[must_use]
    pub fn new(
        name: impl Into<Arc<str>>,
        parent: Role,
        child: Role,
        cardinality: Cardinality,
        child_nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            child,
            cardinality,
            child_nullable,
        }
    }

    /// Shorthand for a `OneToOne` connection between concrete types.
    #[must_use]
    pub fn one_to_one(
        name: impl Into<Arc<str>>,
        parent: TypeTag,
        child: TypeTag,
        child_nullable: bool,
    ) -> Self {
        Self::new(
            name,
            Role::Concrete(parent),
            Role::Concrete(child),
            Cardinality::OneToOne,
            child_nullable,
        )
    }

    /// Shorthand for a `OneToMany` connection between concrete types.
    #[must_use]
    pub fn one_to_many(
        name: impl Into<Arc<str>>,
        parent: TypeTag,
        child: TypeTag,
        child_nullable: bool,
    ) -> Self {
        Self::new(
            name,
            Role::Concrete(parent),
            Role::Concrete(child),
            Cardinality::OneToMany,
            child_nullable,
        )
    }

    /// Relation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent role.
    #[must_use]
    pub fn parent(&self) -> &Role {
        &self.parent
    }

    /// Child role.
    #[must_use]
    pub fn child(&self) -> &Role {
        &self.child
    }

    /// Cardinality.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Whether a child may exist without a parent.
    #[must_use]
    pub fn is_child_nullable(&self) -> bool {
        self.child_nullable
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionId({} {:?} -{:?}-> {:?}{})",
            self.name,
            self.parent,
            self.cardinality,
            self.child,
            if self.child_nullable { "?" } else { "" }
        )
    }
}

/// Registry of entity types and connections.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    types: Vec<EntitySchema>,
    by_name: HashMap<Arc<str>, TypeTag>,
    connections: Vec<ConnectionId>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type and returns its tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the type name is taken, a field is declared twice,
    /// or the symbolic id field is not a declared field.
    pub fn register_type(&mut self, schema: EntitySchema) -> Result<TypeTag> {
        if self.by_name.contains_key(&schema.name) {
            return Err(Error::schema(format!(
                "entity type already registered: {}",
                schema.name
            )));
        }
        for (i, field) in schema.fields.iter().enumerate() {
            if schema.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::schema(format!(
                    "field `{}` declared twice on {}",
                    field.name, schema.name
                )));
            }
        }
        if let Some(symbolic) = &schema.symbolic_field {
            if schema.field(symbolic).is_none() {
                return Err(Error::schema(format!(
                    "symbolic id field `{symbolic}` is not a field of {}",
                    schema.name
                )));
            }
        }

        let raw = u32::try_from(self.types.len())
            .map_err(|_| Error::schema("too many entity types"))?;
        let tag = TypeTag::new(raw);
        self.by_name.insert(schema.name.clone(), tag);
        self.types.push(schema);
        Ok(tag)
    }

    /// Registers a connection and returns it for use as a key.
    ///
    /// # Errors
    ///
    /// Returns an error if a role names an unknown type, the child role does
    /// not match the cardinality (abstract cardinalities need an abstract
    /// child, the others a concrete one), or the connection is registered
    /// already.
    pub fn register_connection(&mut self, connection: ConnectionId) -> Result<ConnectionId> {
        for role in [&connection.parent, &connection.child] {
            if let Role::Concrete(tag) = role {
                self.entity(*tag)?;
            }
        }
        let child_is_abstract = matches!(connection.child, Role::Abstract(_));
        if connection.cardinality.is_abstract() != child_is_abstract {
            return Err(Error::schema(format!(
                "{connection:?}: cardinality does not match the child role"
            )));
        }
        if self.connections.iter().any(|c| {
            c.name == connection.name && c.parent == connection.parent && c.child == connection.child
        }) {
            return Err(Error::schema(format!(
                "connection already registered: {connection:?}"
            )));
        }
        self.connections.push(connection.clone());
        Ok(connection)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Iterates over every registered type tag.
    pub fn type_tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        (0..self.types.len()).filter_map(|i| u32::try_from(i).ok().map(TypeTag::new))
    }

    /// Gets the schema of an entity type.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag was not registered.
    pub fn entity(&self, tag: TypeTag) -> Result<&EntitySchema> {
        self.types
            .get(tag.index())
            .ok_or_else(|| Error::schema(format!("unknown entity type {tag:?}")))
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn type_tag(&self, name: &str) -> Option<TypeTag> {
        self.by_name.get(name).copied()
    }

    /// Returns the name of a type, or `?` for unknown tags.
    #[must_use]
    pub fn type_name(&self, tag: TypeTag) -> &str {
        self.types.get(tag.index()).map_or("?", |s| &s.name)
    }

    /// Returns true if the connection was registered.
    #[must_use]
    pub fn has_connection(&self, connection: &ConnectionId) -> bool {
        self.connections.contains(connection)
    }

    /// Iterates over every registered connection.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionId> {
        self.connections.iter()
    }

    /// Connections in which entities of type `tag` may be the child.
    pub fn connections_as_child(&self, tag: TypeTag) -> impl Iterator<Item = &ConnectionId> {
        self.connections
            .iter()
            .filter(move |c| self.role_accepts(&c.child, tag))
    }

    /// Connections in which entities of type `tag` may be the parent.
    pub fn connections_as_parent(&self, tag: TypeTag) -> impl Iterator<Item = &ConnectionId> {
        self.connections
            .iter()
            .filter(move |c| self.role_accepts(&c.parent, tag))
    }

    /// Returns true if an entity of type `tag` can fill `role`.
    #[must_use]
    pub fn role_accepts(&self, role: &Role, tag: TypeTag) -> bool {
        match role {
            Role::Concrete(expected) => *expected == tag,
            Role::Abstract(capability) => self
                .types
                .get(tag.index())
                .is_some_and(|s| s.implements(capability)),
        }
    }

    /// Checks that an entity of type `tag` can fill `role`.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` naming the expected type or capability.
    pub fn check_role(&self, role: &Role, tag: TypeTag) -> Result<()> {
        if self.role_accepts(role, tag) {
            return Ok(());
        }
        let expected = match role {
            Role::Concrete(expected) => format!("type {}", self.type_name(*expected)),
            Role::Abstract(capability) => format!("capability {capability}"),
        };
        Err(Error::type_mismatch(
            expected,
            format!("type {}", self.type_name(tag)),
        ))
    }

    /// Checks that `value` may be stored in field `field` of type `tag`.
    ///
    /// # Errors
    ///
    /// Returns a schema error for unknown fields and `TypeMismatch` for
    /// values of the wrong type.
    pub fn check_field(&self, tag: TypeTag, field: &str, value: &Value) -> Result<()> {
        let entity = self.entity(tag)?;
        let schema = entity.field(field).ok_or_else(|| {
            Error::schema(format!("unknown field `{field}` on {}", entity.name))
        })?;
        if schema.ty.accepts(value) {
            Ok(())
        } else {
            Err(Error::type_mismatch(
                format!("{} for {}.{field}", schema.ty, entity.name),
                value.value_type().to_string(),
            ))
        }
    }

    /// Derives the symbolic id of a record, if its type declares one and the
    /// symbolic field holds a string.
    #[must_use]
    pub fn symbolic_id_of(&self, data: &EntityData) -> Option<SymbolicId> {
        let field = self.types.get(data.type_tag().index())?.symbolic_field.as_ref()?;
        let name = data.get(field)?.as_str()?;
        Some(SymbolicId::new(data.type_tag(), name))
    }
}

/// Supplies the schema a store is initialized with.
///
/// Implemented by code generators and hand-written model definitions; the
/// store consumes the schema once and never re-validates it per mutation.
pub trait SchemaProvider {
    /// Builds the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's declarations are inconsistent.
    fn provide_schema(&self) -> Result<Schema>;
}

impl SchemaProvider for Schema {
    fn provide_schema(&self) -> Result<Schema> {
        Ok(self.clone())
    }
}
