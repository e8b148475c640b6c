//! In-memory record collection.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::{record_id, strip_managed, Record, RecordStore, CREATED_AT_FIELD, ID_FIELD};
use crate::error::Result;
use crate::query::{compare_records, matches_all, QueryRequest};

struct Inner {
    next_id: i64,
    last_created: Option<DateTime<Utc>>,
    records: Vec<Record>,
}

/// A collection held in process memory, in insertion order.
pub struct InMemoryStore {
    name: String,
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner {
                next_id: 1,
                last_created: None,
                records: Vec::new(),
            }),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    // Strictly increasing so insertion order and createdAt order agree.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_created {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_created = Some(now);
        now
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.records.iter().position(|r| record_id(r) == Some(id))
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn find_many(&self, request: QueryRequest) -> Result<Vec<Record>> {
        let mut matched: Vec<Record> = {
            let inner = self.inner.read();
            inner
                .records
                .iter()
                .filter(|r| matches_all(&request.filter, r))
                .cloned()
                .collect()
        };

        if !request.sort.is_empty() {
            matched.sort_by(|a, b| compare_records(&request.sort, a, b));
        }

        let page = match request.pagination {
            Some(pagination) => pagination.paginate_iter(matched.into_iter()),
            None => matched,
        };

        debug!(collection = %self.name, returned = page.len(), "find_many");

        Ok(page.into_iter().map(|r| request.project(r)).collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Record>> {
        let inner = self.inner.read();
        Ok(inner.position(id).map(|i| inner.records[i].clone()))
    }

    async fn insert(&self, fields: Record) -> Result<Record> {
        let mut record = strip_managed(fields);
        let mut inner = self.inner.write();

        let id = inner.next_id;
        inner.next_id += 1;
        let created_at = inner.next_created_at();

        record.insert(ID_FIELD.to_string(), Value::from(id));
        record.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        inner.records.push(record.clone());

        Ok(record)
    }

    async fn update(&self, id: i64, patch: Record) -> Result<Option<Record>> {
        let patch = strip_managed(patch);
        let mut inner = self.inner.write();

        let Some(index) = inner.position(id) else {
            return Ok(None);
        };

        let record = &mut inner.records[index];
        for (key, value) in patch {
            record.insert(key, value);
        }
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.position(id) {
            Some(index) => {
                inner.records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OffsetPagination, SortField};
    use serde_json::json;

    fn fields(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_created_at() {
        let store = InMemoryStore::new("events");
        let a = store.insert(fields(json!({"title": "a", "id": 99}))).await.unwrap();
        let b = store.insert(fields(json!({"title": "b"}))).await.unwrap();

        assert_eq!(record_id(&a), Some(1));
        assert_eq!(record_id(&b), Some(2));
        assert!(a[CREATED_AT_FIELD].as_str().unwrap() < b[CREATED_AT_FIELD].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = InMemoryStore::new("events");
        let a = store.insert(fields(json!({"title": "a"}))).await.unwrap();
        let id = record_id(&a).unwrap();

        let updated = store
            .update(id, fields(json!({"title": "renamed", "id": 7})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["title"], "renamed");
        assert_eq!(record_id(&updated), Some(id));

        assert!(store.update(42, Record::new()).await.unwrap().is_none());
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_find_many_sorts_and_pages() {
        let store = InMemoryStore::new("users");
        for n in 1..=7 {
            store.insert(fields(json!({"n": n}))).await.unwrap();
        }

        let request = QueryRequest {
            sort: vec![SortField::desc("n")],
            pagination: Some(OffsetPagination::new(2, 3)),
            ..QueryRequest::default()
        };
        let page = store.find_many(request).await.unwrap();
        let ns: Vec<i64> = page.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![4, 3, 2]);
    }
}
