//! Shared project-model schema for the storage integration tests.

use entigraph_foundation::{Capability, EntitySource, FieldType, StoreConfig, TypeTag, Value};
use entigraph_storage::{
    Cardinality, ConnectionId, EntityData, EntitySchema, FieldSchema, Role, Schema, Snapshot,
};
use tracing_subscriber::filter::LevelFilter;

/// Routes store logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(LevelFilter::DEBUG)
        .try_init();
}

pub struct Project {
    pub schema: Schema,
    pub parent: TypeTag,
    pub child: TypeTag,
    pub module: TypeTag,
    pub settings: TypeTag,
    pub facet: TypeTag,
    pub library: TypeTag,
    /// Parent -> Child, ordered, a child cannot exist without its parent.
    pub children: ConnectionId,
    /// Parent -> Child, ordered, children may be detached.
    pub members: ConnectionId,
    /// Parent -> Parent, for nesting.
    pub subgroups: ConnectionId,
    /// Module -> Settings, required.
    pub settings_of: ConnectionId,
    /// Module -> Facet, optional.
    pub facet_of: ConnectionId,
    /// Module -> any Dependency.
    pub deps: ConnectionId,
}

pub fn project() -> Project {
    let mut schema = Schema::new();
    let parent = schema
        .register_type(
            EntitySchema::new("Parent")
                .with_field(FieldSchema::required("data", FieldType::String)),
        )
        .unwrap();
    let child = schema
        .register_type(
            EntitySchema::new("Child")
                .with_field(FieldSchema::required("data", FieldType::String)),
        )
        .unwrap();
    let module = schema
        .register_type(
            EntitySchema::new("Module")
                .with_field(FieldSchema::required("name", FieldType::String))
                .with_field(FieldSchema::optional_none(
                    "libs",
                    FieldType::list(FieldType::Symbolic),
                ))
                .with_symbolic_id("name"),
        )
        .unwrap();
    let settings = schema
        .register_type(EntitySchema::new("Settings").with_field(FieldSchema::optional(
            "level",
            FieldType::Int,
            Value::Int(8),
        )))
        .unwrap();
    let facet = schema
        .register_type(
            EntitySchema::new("Facet").with_field(FieldSchema::required("name", FieldType::String)),
        )
        .unwrap();
    let library = schema
        .register_type(
            EntitySchema::new("Library")
                .with_field(FieldSchema::required("name", FieldType::String))
                .with_capability(Capability::new("Dependency"))
                .with_symbolic_id("name"),
        )
        .unwrap();

    let children = schema
        .register_connection(ConnectionId::one_to_many("parent", parent, child, false))
        .unwrap();
    let members = schema
        .register_connection(ConnectionId::one_to_many("group", parent, child, true))
        .unwrap();
    let subgroups = schema
        .register_connection(ConnectionId::one_to_many("outer", parent, parent, true))
        .unwrap();
    let settings_of = schema
        .register_connection(ConnectionId::one_to_one("module", module, settings, false))
        .unwrap();
    let facet_of = schema
        .register_connection(ConnectionId::one_to_one("module", module, facet, true))
        .unwrap();
    let deps = schema
        .register_connection(ConnectionId::new(
            "owner",
            Role::Concrete(module),
            Role::Abstract(Capability::new("Dependency")),
            Cardinality::OneToAbstractMany,
            true,
        ))
        .unwrap();

    Project {
        schema,
        parent,
        child,
        module,
        settings,
        facet,
        library,
        children,
        members,
        subgroups,
        settings_of,
        facet_of,
        deps,
    }
}

impl Project {
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_with(StoreConfig::default())
    }

    pub fn snapshot_with(&self, config: StoreConfig) -> Snapshot {
        Snapshot::with_config(self.schema.clone(), config)
    }
}

pub fn record(tag: TypeTag) -> EntityData {
    EntityData::new(tag, EntitySource::new("test"))
}

pub fn named(tag: TypeTag, field: &str, value: &str) -> EntityData {
    record(tag).with(field, value)
}
