//! Integration tests for Value and FieldType
//!
//! Tests type checking, soft-link detection, and symbolic rewriting.

use entigraph_foundation::{FieldType, SymbolicId, TypeTag, Value};

fn sid(name: &str) -> SymbolicId {
    SymbolicId::new(TypeTag::new(0), name)
}

// =============================================================================
// Type Checking
// =============================================================================

#[test]
fn null_is_accepted_by_every_type() {
    for ty in [
        FieldType::Bool,
        FieldType::Int,
        FieldType::String,
        FieldType::Symbolic,
        FieldType::list(FieldType::Int),
    ] {
        assert!(ty.accepts(&Value::Null), "{ty} rejected null");
    }
}

#[test]
fn float_fields_accept_integers() {
    assert!(FieldType::Float.accepts(&Value::Int(3)));
    assert!(!FieldType::Int.accepts(&Value::Float(3.0)));
}

#[test]
fn lists_check_every_element() {
    let ty = FieldType::list(FieldType::String);
    assert!(ty.accepts(&Value::list([Value::from("a"), Value::from("b")])));
    assert!(!ty.accepts(&Value::list([Value::from("a"), Value::Int(1)])));
}

#[test]
fn soft_link_types() {
    assert!(FieldType::Symbolic.is_soft_link());
    assert!(FieldType::list(FieldType::list(FieldType::Symbolic)).is_soft_link());
    assert!(FieldType::Any.is_soft_link());
    assert!(!FieldType::list(FieldType::String).is_soft_link());
}

// =============================================================================
// Symbolic Rewriting
// =============================================================================

#[test]
fn replace_symbolic_rewrites_nested_lists() {
    let value = Value::list([
        Value::Symbolic(sid("core")),
        Value::list([Value::Symbolic(sid("core")), Value::Symbolic(sid("util"))]),
    ]);
    let rewritten = value.replace_symbolic(&sid("core"), &sid("base")).unwrap();

    let mut seen = Vec::new();
    rewritten.for_each_symbolic(&mut |id| seen.push(id.name.to_string()));
    assert_eq!(seen, vec!["base", "base", "util"]);
}

#[test]
fn replace_symbolic_without_match_is_none() {
    let value = Value::list([Value::Symbolic(sid("util")), Value::Int(1)]);
    assert!(value.replace_symbolic(&sid("core"), &sid("base")).is_none());
}

#[test]
fn display_marks_symbolic_ids() {
    let value = Value::list([Value::Symbolic(sid("core")), Value::from("x")]);
    assert_eq!(format!("{value}"), "[@core, \"x\"]");
}
