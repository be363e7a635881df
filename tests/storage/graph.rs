//! Integration tests for the root graph
//!
//! Tests publishing, stale builders, observers, lenient commits, and
//! structural sharing between versions.

use std::sync::{Arc, Mutex};

use entigraph_foundation::{ErrorKind, Result, StoreConfig};
use entigraph_storage::{
    ChangeEvent, ChangeObserver, ChangeSet, EntityGraph, EntityStorage, Schema, SchemaProvider,
    Snapshot,
};

use crate::fixture::{init_tracing, named, project, record};

#[derive(Default)]
struct Log {
    commits: Mutex<Vec<(u64, Vec<ChangeEvent>)>>,
}

impl ChangeObserver for Log {
    fn changes_committed(&self, snapshot: &Snapshot, changes: &ChangeSet) {
        self.commits
            .lock()
            .unwrap()
            .push((snapshot.version(), changes.events()));
    }
}

struct Fixed(Schema);

impl SchemaProvider for Fixed {
    fn provide_schema(&self) -> Result<Schema> {
        Ok(self.0.clone())
    }
}

#[test]
fn graph_from_provider_starts_empty() {
    let p = project();
    let graph =
        EntityGraph::from_provider(&Fixed(p.schema.clone()), StoreConfig::default()).unwrap();

    assert_eq!(graph.snapshot().version(), 0);
    assert_eq!(graph.snapshot().total_entity_count(), 0);
    assert_eq!(graph.snapshot().schema().type_tag("Module"), Some(p.module));
}

#[test]
fn observers_see_removals_then_mutations_then_additions() {
    init_tracing();
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let log = Arc::new(Log::default());
    graph.add_observer(log.clone());

    let ((gone, kept), _) = graph
        .update(|b| {
            let gone = b.add_entity(named(p.parent, "data", "gone"))?;
            let kept = b.add_entity(named(p.parent, "data", "kept"))?;
            Ok((gone, kept))
        })
        .unwrap();
    let (added, _) = graph
        .update(|b| {
            b.remove_entity(gone)?;
            b.set_field(kept, "data", "changed")?;
            b.add_entity(named(p.parent, "data", "new"))
        })
        .unwrap();

    let commits = log.commits.lock().unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(
        commits[1],
        (
            2,
            vec![
                ChangeEvent::Removed(gone),
                ChangeEvent::Mutated(kept),
                ChangeEvent::Added(added),
            ]
        )
    );
}

#[test]
fn builders_from_old_snapshots_are_stale() {
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let mut late = graph.builder();
    graph
        .update(|b| b.add_entity(named(p.parent, "data", "first")))
        .unwrap();

    late.add_entity(named(p.parent, "data", "late")).unwrap();
    let err = graph.commit(&mut late).unwrap_err();

    assert_eq!(err.kind, ErrorKind::StaleBuilder { base: 0, current: 1 });
    assert_eq!(graph.snapshot().entity_count(p.parent), 1);

    let mut rebuilt = graph.builder();
    rebuilt.add_entity(named(p.parent, "data", "late")).unwrap();
    assert!(graph.commit(&mut rebuilt).is_ok());
    assert_eq!(graph.snapshot().version(), 2);
}

#[test]
fn builders_from_another_graph_are_stale() {
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let other = EntityGraph::new(p.schema.clone());
    let mut foreign = other.builder();
    let id = foreign.add_entity(named(p.parent, "data", "foreign")).unwrap();

    let err = graph.commit(&mut foreign).unwrap_err();

    assert_eq!(err.kind, ErrorKind::StaleBuilder { base: 0, current: 0 });
    assert!(!graph.snapshot().contains(id));
    assert!(!foreign.is_committed());
}

#[test]
fn builders_from_a_diverged_lineage_are_stale() {
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let (id, _) = graph
        .update(|b| b.add_entity(named(p.parent, "data", "start")))
        .unwrap();

    // Commit a side branch outside the graph, then move the graph on
    let mut side = graph.builder();
    side.set_field(id, "data", "side").unwrap();
    let side = side.commit().unwrap().snapshot;
    graph.update(|b| b.set_field(id, "data", "main")).unwrap();
    assert_eq!(side.version(), graph.snapshot().version());

    let mut late = side.builder();
    late.set_field(id, "data", "late").unwrap();
    let err = graph.commit(&mut late).unwrap_err();

    assert_eq!(err.kind, ErrorKind::StaleBuilder { base: 2, current: 2 });
    assert_eq!(
        graph.snapshot().get(id).unwrap().get("data").unwrap().as_str(),
        Some("main")
    );
}

#[test]
fn edits_back_to_the_current_state_publish_nothing() {
    let p = project();
    let log = Arc::new(Log::default());
    let mut graph = EntityGraph::new(p.schema.clone());
    graph.add_observer(log.clone());
    let (id, _) = graph
        .update(|b| b.add_entity(named(p.parent, "data", "p")))
        .unwrap();
    let before = graph.snapshot();

    let (_, changes) = graph
        .update(|b| {
            b.set_field(id, "data", "q")?;
            b.set_field(id, "data", "p")
        })
        .unwrap();

    assert!(changes.is_empty());
    assert!(graph.snapshot().same_snapshot(&before));
    assert_eq!(log.commits.lock().unwrap().len(), 1);
}

#[test]
fn old_snapshots_stay_readable_after_commits() {
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let (id, _) = graph
        .update(|b| b.add_entity(named(p.parent, "data", "v1")))
        .unwrap();
    let v1 = graph.snapshot();
    graph.update(|b| b.set_field(id, "data", "v2")).unwrap();

    assert_eq!(v1.get(id).unwrap().get("data").unwrap().as_str(), Some("v1"));
    assert_eq!(
        graph.snapshot().get(id).unwrap().get("data").unwrap().as_str(),
        Some("v2")
    );
}

#[test]
fn lenient_commit_drops_violators_and_reports_them() {
    init_tracing();
    let p = project();
    let mut graph = EntityGraph::with_config(p.schema.clone(), StoreConfig::lenient());

    let ((good, orphan, unnamed), changes) = graph
        .update(|b| {
            let good = b.add_entity(named(p.parent, "data", "p"))?;
            let orphan = b.add_entity(named(p.child, "data", "c"))?;
            let unnamed = b.add_entity(record(p.module))?;
            Ok((good, orphan, unnamed))
        })
        .unwrap();

    let snapshot = graph.snapshot();
    assert!(snapshot.contains(good));
    assert!(!snapshot.contains(orphan));
    assert!(!snapshot.contains(unnamed));
    let rejected: Vec<_> = changes.rejected.iter().map(|(id, _)| *id).collect();
    assert_eq!(rejected, vec![orphan, unnamed]);
    assert!(matches!(changes.rejected[0].1, ErrorKind::Consistency { .. }));
    assert!(matches!(
        changes.rejected[1].1,
        ErrorKind::UninitializedField { .. }
    ));
    assert_eq!(changes.created.iter().copied().collect::<Vec<_>>(), vec![good]);
}

#[test]
fn untouched_types_share_storage_across_versions() {
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let (module, _) = graph
        .update(|b| {
            b.add_entity(named(p.parent, "data", "p"))?;
            b.add_entity(named(p.module, "name", "core"))
        })
        .unwrap();
    let before = graph.snapshot();
    graph.update(|b| b.set_field(module, "name", "base")).unwrap();
    let after = graph.snapshot();

    assert!(after.shares_partition_with(&before, p.parent));
    assert!(!after.shares_partition_with(&before, p.module));
}
