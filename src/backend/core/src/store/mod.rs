//! Record storage.
//!
//! Records are JSON objects kept in named collections. Every stored record
//! carries an integer `id` and an RFC 3339 `createdAt` assigned on insert;
//! callers cannot overwrite either.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{connect, PgCollection};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::query::QueryRequest;

/// Identifier field present on every record.
pub const ID_FIELD: &str = "id";

/// Creation timestamp field present on every record.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A stored record.
pub type Record = Map<String, Value>;

/// A collection of records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Collection name, used in logs and metrics.
    fn collection(&self) -> &str;

    /// Run a query and return the matching records in order.
    async fn find_many(&self, request: QueryRequest) -> Result<Vec<Record>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Record>>;

    /// Store a new record and return it with `id` and `createdAt` set.
    async fn insert(&self, fields: Record) -> Result<Record>;

    /// Merge `patch` into an existing record. Returns `None` when missing.
    async fn update(&self, id: i64, patch: Record) -> Result<Option<Record>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// Read the integer id of a record.
pub fn record_id(record: &Record) -> Option<i64> {
    record.get(ID_FIELD).and_then(Value::as_i64)
}

/// Drop store-managed fields from caller input.
pub(crate) fn strip_managed(mut fields: Record) -> Record {
    fields.remove(ID_FIELD);
    fields.remove(CREATED_AT_FIELD);
    fields
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collections
// ═══════════════════════════════════════════════════════════════════════════════

/// The collections behind the REST resources.
#[derive(Clone)]
pub struct Collections {
    pub events: Arc<dyn RecordStore>,
    pub collaborators: Arc<dyn RecordStore>,
    pub edit_sessions: Arc<dyn RecordStore>,
    pub users: Arc<dyn RecordStore>,
}

impl Collections {
    /// Process-local collections.
    pub fn in_memory() -> Self {
        Self {
            events: Arc::new(InMemoryStore::new("events")),
            collaborators: Arc::new(InMemoryStore::new("collaborators")),
            edit_sessions: Arc::new(InMemoryStore::new("edit_sessions")),
            users: Arc::new(InMemoryStore::new("users")),
        }
    }

    /// Postgres collections when `database.url` is set, in memory otherwise.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if config.url.is_none() {
            tracing::warn!("database.url not set, records are kept in memory");
            return Ok(Self::in_memory());
        }
        Self::postgres(connect(config).await?)
    }

    /// Collections backed by document tables in Postgres.
    pub fn postgres(pool: sqlx::PgPool) -> Result<Self> {
        Ok(Self {
            events: Arc::new(PgCollection::new(pool.clone(), "events")?),
            collaborators: Arc::new(PgCollection::new(pool.clone(), "collaborators")?),
            edit_sessions: Arc::new(PgCollection::new(pool.clone(), "edit_sessions")?),
            users: Arc::new(PgCollection::new(pool, "users")?),
        })
    }
}
