//! Postgres-backed record collection.
//!
//! Each collection is a document table:
//!
//! ```sql
//! CREATE TABLE events (
//!     id  BIGSERIAL PRIMARY KEY,
//!     doc JSONB NOT NULL
//! );
//! ```
//!
//! The whole record, `id` and `createdAt` included, lives in `doc`. Field
//! names reach SQL only as bind parameters; the table name is checked
//! against a strict identifier pattern.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{strip_managed, Record, RecordStore, CREATED_AT_FIELD, ID_FIELD};
use crate::config::DatabaseConfig;
use crate::error::{CalendarError, ErrorCode, Result};
use crate::query::{Predicate, QueryRequest, Scalar, ScalarKind, SortDirection, SortField};

const TABLE_NAME_PATTERN: &str = r"^[a-z_][a-z0-9_]{0,62}$";

/// Open a connection pool.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config.url.as_deref().ok_or_else(|| {
        CalendarError::new(ErrorCode::MissingConfiguration, "Database URL is not configured")
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    info!(max_connections = config.max_connections, "Connected to Postgres");
    Ok(pool)
}

/// A collection stored as JSONB documents in one table.
#[derive(Clone)]
pub struct PgCollection {
    pool: PgPool,
    table: String,
}

impl PgCollection {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let pattern = Regex::new(TABLE_NAME_PATTERN)
            .map_err(|e| CalendarError::internal(format!("table name pattern: {}", e)))?;
        if !pattern.is_match(&table) {
            return Err(CalendarError::with_internal(
                ErrorCode::InvalidConfiguration,
                "Invalid collection name",
                format!("rejected table name '{}'", table),
            ));
        }

        Ok(Self { pool, table })
    }

    /// Build the SELECT for a request. Exposed for inspection in tests.
    pub fn select_query<'a>(&self, request: &'a QueryRequest) -> QueryBuilder<'a, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT doc FROM {} WHERE TRUE", self.table));

        for predicate in &request.filter {
            qb.push(" AND ");
            push_predicate(&mut qb, predicate);
        }

        if !request.sort.is_empty() {
            qb.push(" ORDER BY ");
            for (i, field) in request.sort.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_sort(&mut qb, field);
            }
        }

        if let Some(pagination) = request.pagination {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(pagination.limit).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX));
        }

        qb
    }
}

fn push_predicate<'a>(qb: &mut QueryBuilder<'a, Postgres>, predicate: &'a Predicate) {
    match predicate {
        Predicate::Eq { field, value } => push_equality(qb, field, value),
        Predicate::AnyOf { field, values } => {
            qb.push("(FALSE");
            for value in values {
                qb.push(" OR ");
                push_equality(qb, field, value);
            }
            qb.push(")");
        }
        Predicate::Range { field, op, value } => {
            qb.push("(CASE jsonb_typeof(doc->").push_bind(field.as_str()).push(")");
            match value.as_f64() {
                Some(n) => {
                    qb.push(" WHEN 'number' THEN (doc->>")
                        .push_bind(field.as_str())
                        .push(")::float8 ")
                        .push(op.sql_operator())
                        .push(" ")
                        .push_bind(n);
                }
                None => {
                    qb.push(" WHEN 'number' THEN FALSE");
                }
            }
            qb.push(" WHEN 'string' THEN doc->>")
                .push_bind(field.as_str())
                .push(" COLLATE \"C\" ")
                .push(op.sql_operator())
                .push(" ")
                .push_bind(value.raw())
                .push(" ELSE FALSE END)");
        }
    }
}

fn push_equality<'a>(qb: &mut QueryBuilder<'a, Postgres>, field: &'a str, value: &'a Scalar) {
    qb.push("(CASE COALESCE(jsonb_typeof(doc->")
        .push_bind(field)
        .push("), 'null')");

    match value.as_f64() {
        Some(n) => {
            qb.push(" WHEN 'number' THEN (doc->>")
                .push_bind(field)
                .push(")::float8 = ")
                .push_bind(n);
        }
        None => {
            qb.push(" WHEN 'number' THEN FALSE");
        }
    }

    qb.push(" WHEN 'string' THEN doc->>")
        .push_bind(field)
        .push(" = ")
        .push_bind(value.raw());

    let boolean = matches!(value.kind(), ScalarKind::Boolean(_));
    qb.push(" WHEN 'boolean' THEN ")
        .push_bind(boolean)
        .push(" AND doc->>")
        .push_bind(field)
        .push(" = ")
        .push_bind(value.raw());

    qb.push(" WHEN 'null' THEN ").push_bind(value.raw()).push(" = 'null'");

    qb.push(" WHEN 'array' THEN (doc->")
        .push_bind(field)
        .push(" @> ")
        .push_bind(Json(Value::Array(vec![value.to_json()])))
        .push(" OR doc->")
        .push_bind(field)
        .push(" @> ")
        .push_bind(Json(Value::Array(vec![Value::String(value.raw().to_string())])))
        .push(") ELSE FALSE END)");
}

fn push_sort<'a>(qb: &mut QueryBuilder<'a, Postgres>, field: &'a SortField) {
    qb.push("doc->").push_bind(field.name.as_str()).push(" ");
    qb.push(field.direction.sql_keyword());
    qb.push(match field.direction {
        SortDirection::Asc => " NULLS FIRST",
        SortDirection::Desc => " NULLS LAST",
    });
}

fn into_record(doc: Json<Value>) -> Record {
    match doc.0 {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

#[async_trait]
impl RecordStore for PgCollection {
    fn collection(&self) -> &str {
        &self.table
    }

    async fn find_many(&self, request: QueryRequest) -> Result<Vec<Record>> {
        let docs: Vec<Json<Value>> = {
            let mut qb = self.select_query(&request);
            qb.build_query_scalar::<Json<Value>>().fetch_all(&self.pool).await?
        };

        debug!(collection = %self.table, returned = docs.len(), "find_many");

        Ok(docs
            .into_iter()
            .map(|doc| request.project(into_record(doc)))
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Record>> {
        let doc: Option<Json<Value>> =
            sqlx::query_scalar(&format!("SELECT doc FROM {} WHERE id = $1", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(doc.map(into_record))
    }

    async fn insert(&self, fields: Record) -> Result<Record> {
        let mut record = strip_managed(fields);

        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence($1, 'id'))")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await?;

        record.insert(ID_FIELD.to_string(), Value::from(id));
        record.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );

        sqlx::query(&format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", self.table))
            .bind(id)
            .bind(Json(&record))
            .execute(&self.pool)
            .await?;

        Ok(record)
    }

    async fn update(&self, id: i64, patch: Record) -> Result<Option<Record>> {
        let patch = strip_managed(patch);

        let doc: Option<Json<Value>> = sqlx::query_scalar(&format!(
            "UPDATE {} SET doc = doc || $1 WHERE id = $2 RETURNING doc",
            self.table
        ))
        .bind(Json(&patch))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc.map(into_record))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OffsetPagination, QueryConfig, QueryFeatures, QueryParams};

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/calendar")
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        assert!(PgCollection::new(lazy_pool(), "events; DROP TABLE users").is_err());
        assert!(PgCollection::new(lazy_pool(), "edit_sessions").is_ok());
    }

    #[tokio::test]
    async fn test_select_query_binds_fields() {
        let collection = PgCollection::new(lazy_pool(), "events").unwrap();
        let request = QueryFeatures::new(
            QueryParams::from_pairs([("title", "standup"), ("age[gte]", "18"), ("sort", "-createdAt")]),
            &QueryConfig::default(),
        )
        .all()
        .unwrap()
        .build();

        let qb = collection.select_query(&request);
        let sql = qb.sql();

        assert!(sql.starts_with("SELECT doc FROM events WHERE TRUE AND "));
        assert!(!sql.contains("standup"));
        assert!(!sql.contains("title"));
        assert!(sql.contains(" DESC NULLS LAST"));
        assert!(sql.contains(" LIMIT $"));
    }

    #[tokio::test]
    async fn test_select_without_features() {
        let collection = PgCollection::new(lazy_pool(), "users").unwrap();
        let request = QueryRequest {
            pagination: Some(OffsetPagination::new(1, 10)),
            ..QueryRequest::default()
        };
        let qb = collection.select_query(&request);
        assert_eq!(qb.sql(), "SELECT doc FROM users WHERE TRUE LIMIT $1 OFFSET $2");
    }
}
