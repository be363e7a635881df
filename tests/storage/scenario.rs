//! End-to-end scenarios over the public API.

use std::thread;

use entigraph_foundation::{ErrorKind, Value};
use entigraph_storage::{EntityGraph, EntityStorage};

use crate::fixture::{init_tracing, named, project};

#[test]
fn parent_with_two_children() {
    init_tracing();
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());

    let ((parent, first, second), _) = graph
        .update(|b| {
            let parent = b.add_entity(named(p.parent, "data", "p"))?;
            let first = b.add_entity(named(p.child, "data", "c1"))?;
            let second = b.add_entity(named(p.child, "data", "c2"))?;
            b.replace_children(&p.children, parent, &[first, second])?;
            Ok((parent, first, second))
        })
        .unwrap();

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.children(&p.children, parent).len(), 2);
    for child in [first, second] {
        let owner = snapshot
            .extract_one_to_many_parent(&p.children, child)
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot.get(owner).unwrap().get("data"),
            Some(&Value::from("p"))
        );
    }

    graph
        .update(|b| b.replace_children(&p.children, parent, &[second]))
        .unwrap();

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.children(&p.children, parent), vec![second]);
    assert_eq!(
        snapshot.get(first).unwrap_err().kind,
        ErrorKind::NotFound(first)
    );
    assert_eq!(snapshot.parent(&p.children, second), Some(parent));
}

#[test]
fn readers_on_other_threads_see_a_stable_snapshot() {
    let p = project();
    let mut graph = EntityGraph::new(p.schema.clone());
    let (id, _) = graph
        .update(|b| b.add_entity(named(p.parent, "data", "v1")))
        .unwrap();
    let frozen = graph.snapshot();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let snapshot = frozen.clone();
            thread::spawn(move || {
                (0..100).all(|_| {
                    snapshot.get(id).unwrap().get("data") == Some(&Value::from("v1"))
                })
            })
        })
        .collect();

    for i in 0..10 {
        graph
            .update(|b| b.set_field(id, "data", format!("v{}", i + 2)))
            .unwrap();
    }

    for reader in readers {
        assert!(reader.join().unwrap());
    }
    assert_eq!(graph.snapshot().version(), 11);
}
