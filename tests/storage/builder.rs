//! Integration tests for Builder sessions
//!
//! Tests copy-on-write isolation, commit validation, and session lifecycle.

use entigraph_foundation::{ErrorKind, Value};
use entigraph_storage::{EntityStorage, WriteOp};

use crate::fixture::{named, project, record};

// =============================================================================
// Isolation
// =============================================================================

#[test]
fn builder_writes_never_reach_the_base() {
    let p = project();
    let base = p.snapshot();
    let mut builder = base.builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();

    assert!(builder.contains(id));
    assert!(!base.contains(id));
    assert_eq!(base.total_entity_count(), 0);
}

#[test]
fn builder_reads_its_own_writes() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();
    builder.set_field(id, "data", "q").unwrap();

    assert_eq!(builder.get(id).unwrap().get("data"), Some(&Value::from("q")));
}

#[test]
fn two_builders_from_one_snapshot_are_independent() {
    let p = project();
    let base = p.snapshot();
    let mut a = base.builder();
    let mut b = base.builder();

    a.add_entity(named(p.parent, "data", "a")).unwrap();
    let only_b = b.add_entity(named(p.parent, "data", "b")).unwrap();
    b.add_entity(named(p.parent, "data", "b2")).unwrap();

    assert_eq!(a.entity_count(p.parent), 1);
    assert_eq!(b.entity_count(p.parent), 2);
    assert_eq!(b.get(only_b).unwrap().get("data"), Some(&Value::from("b")));
    assert_ne!(a.session_id(), b.session_id());
}

// =============================================================================
// Commit
// =============================================================================

#[test]
fn no_op_commit_is_idempotent() {
    let p = project();
    let mut builder = p.snapshot().builder();
    builder.add_entity(named(p.parent, "data", "p")).unwrap();
    let first = builder.commit().unwrap().snapshot;

    let mut builder = first.builder();
    let commit = builder.commit().unwrap();

    assert!(commit.changes.is_empty());
    assert_eq!(commit.snapshot.version(), first.version());
    assert!(commit.snapshot.structurally_eq(&first));
}

#[test]
fn writes_that_cancel_out_commit_nothing() {
    let p = project();
    let base = p.snapshot();
    let mut builder = base.builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();
    builder.set_field(id, "data", "q").unwrap();
    builder.remove_entity(id).unwrap();

    assert!(!builder.has_changes());
    let commit = builder.commit().unwrap();
    assert!(commit.changes.is_empty());
    assert_eq!(commit.snapshot.version(), 0);
}

#[test]
fn edits_that_return_to_the_base_commit_nothing() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();
    let base = builder.commit().unwrap().snapshot;

    let mut builder = base.builder();
    builder.set_field(id, "data", "q").unwrap();
    builder.set_field(id, "data", "p").unwrap();
    assert!(!builder.has_changes());
    assert_eq!(builder.write_log().len(), 2);

    let commit = builder.commit().unwrap();
    assert!(commit.changes.is_empty());
    assert_eq!(commit.snapshot.version(), base.version());
    assert!(commit.snapshot.same_snapshot(&base));
}

#[test]
fn mutation_lists_only_fields_that_differ_from_the_base() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(named(p.module, "name", "core")).unwrap();
    let base = builder.commit().unwrap().snapshot;

    let mut builder = base.builder();
    builder.set_field(id, "name", "util").unwrap();
    builder.set_field(id, "libs", Value::list([])).unwrap();
    builder.set_field(id, "name", "core").unwrap();
    let changes = builder.commit().unwrap().changes;

    let fields: Vec<_> = changes.mutated[&id].iter().map(|f| f.to_string()).collect();
    assert_eq!(fields, vec!["libs".to_string()]);
}

#[test]
fn setting_the_same_value_is_not_a_change() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();
    let snapshot = builder.commit().unwrap().snapshot;

    let mut builder = snapshot.builder();
    assert!(!builder.set_field(id, "data", "p").unwrap());
    assert!(builder.write_log().is_empty());
}

#[test]
fn missing_required_field_fails_commit() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(record(p.module)).unwrap();

    let err = builder.commit().unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::UninitializedField {
            entity_type: "Module".into(),
            field: "name".into(),
        }
    );
    assert!(builder.check_initialization(id).is_err());
}

#[test]
fn missing_one_to_one_parent_fails_commit() {
    let p = project();
    let mut builder = p.snapshot().builder();
    builder.add_entity(record(p.settings)).unwrap();

    let err = builder.commit().unwrap_err();
    match err.kind {
        ErrorKind::Consistency {
            entity_type,
            relation,
            ..
        } => {
            assert_eq!(entity_type, "Settings");
            assert_eq!(relation, "module");
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
    let frames = err.context.unwrap().stack;
    assert!(frames[0].starts_with("committing Settings"));
}

#[test]
fn rejected_commit_can_be_repaired_and_retried() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let settings = builder.add_entity(record(p.settings)).unwrap();
    assert!(builder.commit().is_err());

    let module = builder.add_entity(named(p.module, "name", "core")).unwrap();
    builder.set_parent(&p.settings_of, settings, Some(module)).unwrap();
    let commit = builder.commit().unwrap();

    assert_eq!(commit.snapshot.version(), 1);
    assert_eq!(
        commit.snapshot.extract_one_to_one_parent(&p.settings_of, settings).unwrap(),
        Some(module)
    );
    assert_eq!(
        commit.snapshot.get(settings).unwrap().get("level"),
        Some(&Value::Int(8))
    );
}

#[test]
fn committing_twice_is_an_error() {
    let p = project();
    let mut builder = p.snapshot().builder();
    builder.commit().unwrap();

    assert_eq!(builder.commit().unwrap_err().kind, ErrorKind::DuplicateCommit);
    assert!(builder.is_committed());
}

#[test]
fn writes_after_commit_fail() {
    let p = project();
    let mut builder = p.snapshot().builder();
    builder.commit().unwrap();

    let err = builder.add_entity(named(p.parent, "data", "p")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::BuilderClosed);
}

// =============================================================================
// Eager Validation
// =============================================================================

#[test]
fn wrong_field_type_is_rejected_immediately() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let err = builder
        .add_entity(record(p.parent).with("data", Value::Int(3)))
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    assert_eq!(builder.total_entity_count(), 0);
}

#[test]
fn unknown_field_is_a_schema_error() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();

    let err = builder.set_field(id, "colour", "red").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Schema(_)));
}

#[test]
fn replace_data_rejects_another_type() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let id = builder.add_entity(named(p.parent, "data", "p")).unwrap();

    let err = builder.replace_data(id, named(p.child, "data", "c")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
}

#[test]
fn failed_write_leaves_log_untouched() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let parent = builder.add_entity(named(p.parent, "data", "p")).unwrap();
    let log: Vec<WriteOp> = builder.write_log().to_vec();

    let module = builder.add_entity(named(p.module, "name", "core")).unwrap();
    builder.remove_entity(module).unwrap();
    assert!(builder.add_child(&p.deps, parent, module).is_err());

    assert_eq!(&builder.write_log()[..log.len()], log.as_slice());
    assert_eq!(builder.write_log().len(), log.len() + 2);
}

// =============================================================================
// Removal
// =============================================================================

#[test]
fn stale_ids_do_not_resolve_after_slot_reuse() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let old = builder.add_entity(named(p.parent, "data", "old")).unwrap();
    builder.remove_entity(old).unwrap();
    let new = builder.add_entity(named(p.parent, "data", "new")).unwrap();

    assert_eq!(old.index, new.index);
    assert_ne!(old, new);
    assert_eq!(builder.get(old).unwrap_err().kind, ErrorKind::NotFound(old));
    assert!(builder.remove_entity(old).is_err());
}

#[test]
fn entities_by_source_filters_provenance() {
    let p = project();
    let mut builder = p.snapshot().builder();
    let tagged = builder.add_entity(named(p.parent, "data", "p")).unwrap();
    let mut other = named(p.parent, "data", "q");
    other.set_source(entigraph_foundation::EntitySource::new("import"));
    builder.add_entity(other).unwrap();

    let found = builder.entities_by_source(|s| s.name() == "test");
    assert_eq!(found, vec![tagged]);
}
