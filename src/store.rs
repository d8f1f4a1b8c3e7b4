// src/store.rs
//! Record store boundary.
//!
//! The pipeline only needs a keyed store with insert/get/update/find/count. Durable backends
//! live outside this crate; `InMemoryStore` is what tests and the demo binary use.

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{FeedbackRecord, RecordFilter};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record and return the id assigned to it.
    async fn insert(&self, record: FeedbackRecord) -> Result<String, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<FeedbackRecord>, StoreError>;

    /// Replace the stored record with the same id.
    async fn update(&self, record: &FeedbackRecord) -> Result<(), StoreError>;

    /// Records matching `filter`, oldest first, at most `limit` when given.
    async fn find(
        &self,
        filter: &RecordFilter,
        limit: Option<usize>,
    ) -> Result<Vec<FeedbackRecord>, StoreError>;

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError>;

    /// Cheap liveness check used at pipeline start.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Insertion-ordered in-process store.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of everything stored, oldest first.
    pub fn snapshot(&self) -> Vec<FeedbackRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, mut record: FeedbackRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        record.id = Some(id.clone());
        self.records.write().push(record);
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<FeedbackRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .cloned())
    }

    async fn update(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        let Some(id) = record.id.as_deref() else {
            return Err(StoreError::NotFound("<record without id>".into()));
        };
        let mut guard = self.records.write();
        match guard.iter_mut().find(|r| r.id.as_deref() == Some(id)) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn find(
        &self,
        filter: &RecordFilter,
        limit: Option<usize>,
    ) -> Result<Vec<FeedbackRecord>, StoreError> {
        let guard = self.records.read();
        let it = guard.iter().filter(|r| filter.matches(r)).cloned();
        Ok(match limit {
            Some(n) => it.take(n).collect(),
            None => it.collect(),
        })
    }

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        Ok(self.records.read().iter().filter(|r| filter.matches(r)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_ids_and_get_finds_them() {
        let store = InMemoryStore::new();
        let a = store.insert(FeedbackRecord::new("first one")).await.unwrap();
        let b = store.insert(FeedbackRecord::new("second one")).await.unwrap();
        assert_ne!(a, b);
        let got = store.get_by_id(&b).await.unwrap().unwrap();
        assert_eq!(got.raw_text, "second one");
        assert_eq!(got.id.as_deref(), Some(b.as_str()));
        assert!(store.get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = InMemoryStore::new();
        let mut r = FeedbackRecord::new("ghost record");
        r.id = Some("missing".into());
        let err = store.update(&r).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("missing".into()));
    }

    #[tokio::test]
    async fn find_respects_filter_order_and_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let mut r = FeedbackRecord::new(format!("record {i}"));
            r.flags.needs_ai_analysis = i % 2 == 0;
            store.insert(r).await.unwrap();
        }
        let pending = store
            .find(&RecordFilter::awaiting_analysis(), Some(2))
            .await
            .unwrap();
        let texts: Vec<_> = pending.iter().map(|r| r.raw_text.as_str()).collect();
        assert_eq!(texts, vec!["record 0", "record 2"]);
        assert_eq!(store.count(&RecordFilter::awaiting_analysis()).await.unwrap(), 3);
        assert_eq!(store.count(&RecordFilter::all()).await.unwrap(), 5);
    }
}
