//! Integration tests for the query feature builder against the in-memory store.
//!
//! Tests cover:
//! - Equality and range filtering
//! - Default and explicit sorting
//! - Field projection
//! - Pagination and its limits
//! - Unknown operator policies

use calendar_core::error::ErrorCode;
use calendar_core::query::{OperatorPolicy, QueryConfig, QueryFeatures, QueryParams};
use calendar_core::store::{record_id, InMemoryStore, Record, RecordStore};
use serde_json::{json, Value};

async fn people() -> InMemoryStore {
    let store = InMemoryStore::new("people");
    let rows = [
        json!({"name": "Ada", "email": "ada@example.com", "age": 36, "city": "London"}),
        json!({"name": "Grace", "email": "grace@example.com", "age": 45, "city": "New York"}),
        json!({"name": "Linus", "email": "linus@example.com", "age": 21, "city": "Helsinki"}),
        json!({"name": "Ken", "email": "ken@example.com", "age": 18, "city": "New York"}),
        json!({"name": "Barbara", "email": "barbara@example.com", "age": 30, "city": "Boston"}),
        json!({"name": "Edsger", "email": "edsger@example.com", "age": 72, "city": "Austin"}),
    ];
    for row in rows {
        store.insert(row.as_object().cloned().unwrap()).await.unwrap();
    }
    store
}

async fn query(store: &InMemoryStore, pairs: &[(&str, &str)]) -> Vec<Record> {
    query_with(store, pairs, &QueryConfig::default()).await
}

async fn query_with(store: &InMemoryStore, pairs: &[(&str, &str)], config: &QueryConfig) -> Vec<Record> {
    QueryFeatures::new(QueryParams::from_pairs(pairs.iter().copied()), config)
        .all()
        .unwrap()
        .execute(store)
        .await
        .unwrap()
}

fn names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str).unwrap())
        .collect()
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn test_equality_filter_returns_exact_matches() {
    let store = people().await;
    let records = query(&store, &[("city", "New York")]).await;

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["city"] == "New York"));
}

#[tokio::test]
async fn test_numeric_equality() {
    let store = people().await;
    let records = query(&store, &[("age", "21")]).await;
    assert_eq!(names(&records), vec!["Linus"]);
}

#[tokio::test]
async fn test_range_filter_is_inclusive_and_conjunctive() {
    let store = people().await;
    let records = query(&store, &[("age[gte]", "21"), ("age[lte]", "36")]).await;

    let mut ages: Vec<i64> = records.iter().map(|r| r["age"].as_i64().unwrap()).collect();
    ages.sort_unstable();
    assert_eq!(ages, vec![21, 30, 36]);
}

#[tokio::test]
async fn test_strict_range_operators() {
    let store = people().await;
    let records = query(&store, &[("age[gt]", "21"), ("age[lt]", "72")]).await;

    assert!(records
        .iter()
        .all(|r| (22..72).contains(&r["age"].as_i64().unwrap())));
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_repeated_key_matches_any_value() {
    let store = people().await;
    let records = query(&store, &[("city", "Boston"), ("city", "Austin")]).await;
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_reserved_keys_are_not_filters() {
    let store = people().await;
    let records = query(&store, &[("page", "1"), ("sort", "name"), ("fields", "name"), ("limit", "50")]).await;
    assert_eq!(records.len(), 6);
}

#[tokio::test]
async fn test_bracketed_reserved_keys_are_not_filters() {
    let store = people().await;
    let records = query(&store, &[("limit[gt]", "1"), ("page[gte]", "2"), ("sort[x]", "name")]).await;
    assert_eq!(records.len(), 6);

    let config = QueryConfig::default().with_policy(OperatorPolicy::Reject);
    let records = query_with(&store, &[("limit[ne]", "1"), ("city", "London")], &config).await;
    assert_eq!(names(&records), vec!["Ada"]);
}

#[tokio::test]
async fn test_unknown_operator_dropped_by_default() {
    let store = people().await;
    let records = query(&store, &[("age[ne]", "36"), ("city", "London")]).await;
    assert_eq!(names(&records), vec!["Ada"]);
}

#[tokio::test]
async fn test_unknown_operator_rejected_when_configured() {
    let config = QueryConfig::default().with_policy(OperatorPolicy::Reject);
    let err = QueryFeatures::new(QueryParams::from_pairs([("age[ne]", "36")]), &config)
        .filter()
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::UnsupportedOperator);
    assert_eq!(err.http_status().as_u16(), 400);
}

// ============================================================================
// Sorting
// ============================================================================

#[tokio::test]
async fn test_default_sort_is_newest_first() {
    let store = people().await;
    let records = query(&store, &[]).await;

    let ids: Vec<i64> = records.iter().map(|r| record_id(r).unwrap()).collect();
    assert_eq!(ids, vec![6, 5, 4, 3, 2, 1]);
}

#[tokio::test]
async fn test_multi_key_sort() {
    let store = people().await;
    let records = query(&store, &[("sort", "city,-age")]).await;

    assert_eq!(
        names(&records),
        vec!["Edsger", "Barbara", "Linus", "Ada", "Grace", "Ken"]
    );
}

// ============================================================================
// Projection & Pagination
// ============================================================================

#[tokio::test]
async fn test_projection_keeps_only_requested_fields_and_id() {
    let store = people().await;
    let records = query(&store, &[("fields", "name,email")]).await;

    for record in &records {
        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["email", "id", "name"]);
    }
}

#[tokio::test]
async fn test_second_page() {
    let store = people().await;
    let records = query(&store, &[("sort", "age"), ("page", "2"), ("limit", "5")]).await;

    assert_eq!(names(&records), vec!["Edsger"]);
}

#[tokio::test]
async fn test_default_page_size() {
    let store = InMemoryStore::new("bulk");
    for i in 0..25 {
        store
            .insert(json!({"n": i}).as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    assert_eq!(query(&store, &[]).await.len(), 10);
    assert_eq!(query(&store, &[("page", "3")]).await.len(), 5);
    assert_eq!(query(&store, &[("limit", "junk")]).await.len(), 10);
    assert_eq!(query(&store, &[("limit", "1000")]).await.len(), 25);
}

#[tokio::test]
async fn test_max_limit_clamps_page_size() {
    let store = people().await;
    let config = QueryConfig::default().with_max_limit(2);
    let records = query_with(&store, &[("limit", "100")], &config).await;
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_full_query_string() {
    let store = people().await;
    let records = query(
        &store,
        &[
            ("age[gte]", "18"),
            ("sort", "-age"),
            ("fields", "name,email"),
            ("page", "2"),
            ("limit", "2"),
        ],
    )
    .await;

    assert_eq!(names(&records), vec!["Ada", "Barbara"]);
    assert!(records.iter().all(|r| !r.contains_key("age")));
}
