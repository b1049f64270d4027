//! Query Tests
//!
//! Filter evaluation, planning and projection.

use crate::common::*;

// ============================================================================
// Planning
// ============================================================================

#[test]
fn equality_on_indexed_field_uses_index() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq().int(30);

    assert_eq!(
        q.explain().unwrap(),
        QueryPlan::IndexLookup {
            index: "age".to_string(),
            value: json!(30),
        }
    );

    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["a", "c"]);
    assert_eq!(out.stats.documents_examined, 2);
    assert_eq!(out.stats.matches, 2);
    assert_eq!(out.stats.dangling, 0);
}

#[test]
fn literal_on_the_left_still_uses_index() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().int(25).eq().path("age");

    let out = db.find(&q).unwrap();
    assert!(out.stats.plan.uses_index());
    assert_eq!(key_names(out.keys()), vec!["b"]);
}

#[test]
fn disjunction_scans_everything() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq().int(25);
    q.filter_mut().or().cond().path("id").eq().str("c");

    assert_eq!(q.explain().unwrap(), QueryPlan::FullScan);
    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["b", "c"]);
    assert_eq!(out.stats.documents_examined, 3);
}

#[test]
fn conjunction_filters_index_candidates() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq().int(30);
    q.filter_mut().and().cond().path("id").eq().str("c");

    let out = db.find(&q).unwrap();
    assert!(out.stats.plan.uses_index());
    assert_eq!(out.stats.documents_examined, 2);
    assert_eq!(key_names(out.keys()), vec!["c"]);
}

#[test]
fn unindexed_equality_scans() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("id").eq().str("b");

    let out = db.find(&q).unwrap();
    assert_eq!(out.stats.plan, QueryPlan::FullScan);
    assert_eq!(key_names(out.keys()), vec!["b"]);
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn empty_filter_matches_all_in_key_order() {
    let db = users_db();
    let q = db.select("users").unwrap();
    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["a", "b", "c"]);
}

#[test]
fn chained_comparisons_are_conjunctive() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    // 20 < age < 28
    q.cond().int(20).lt().path("age").lt().int(28);

    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["b"]);
}

#[test]
fn int_and_float_compare_numerically() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("age").gt().float(29.5);

    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["a", "c"]);
}

#[test]
fn missing_field_never_matches() {
    let db = users_db();
    db.put("users", &key('d'), &json!({"id": "d"})).unwrap();

    let mut q = db.select("users").unwrap();
    q.cond().path("age").lt().int(100);
    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["a", "b", "c"]);
}

#[test]
fn comparing_string_with_number_is_an_error() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("id").gt().int(3);

    let err = db.find(&q).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }), "{:?}", err);
}

#[test]
fn nested_fields_are_addressed_by_path() {
    let db = memory_db();
    db.create_collection_with(CollectionSpec::new("places").key_len(1))
        .unwrap();
    db.put("places", &key('x'), &json!({"address": {"city": "Oslo"}}))
        .unwrap();
    db.put("places", &key('y'), &json!({"address": {"city": "Rome"}}))
        .unwrap();

    let mut q = db.select("places").unwrap();
    q.cond().path("address/city").eq().str("Rome");
    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["y"]);
}

#[test]
fn projection_shapes_output_only() {
    let db = users_db();
    let mut q = db.select("users").unwrap().project(["id"]);
    q.cond().path("age").eq().int(25);

    assert_eq!(q.to_string(), "select id from users where age = 25");
    let out = db.find(&q).unwrap();
    assert_eq!(out.documents, vec![(key('b'), json!({"id": "b"}))]);
}

// ============================================================================
// Malformed filters
// ============================================================================

#[test]
fn dangling_operator_is_rejected() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq();
    assert!(matches!(q.explain(), Err(Error::MalformedQuery(_))));
    assert!(matches!(db.find(&q), Err(Error::MalformedQuery(_))));
}

#[test]
fn empty_trailing_clause_is_rejected() {
    let db = users_db();
    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq().int(30);
    q.filter_mut().and();
    assert!(matches!(db.find(&q), Err(Error::MalformedQuery(_))));
}

#[test]
fn query_built_from_where_value() {
    let db = users_db();
    let users = db.collection("users").unwrap();

    let mut filter = Where::new();
    filter.cond().path("age").gt().int(26);
    let q = select(&users).with_filter(filter);

    let out = db.view(|tx| q.execute(tx)).unwrap();
    assert_eq!(out.len(), 2);
}
