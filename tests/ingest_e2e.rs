// tests/ingest_e2e.rs
use async_trait::async_trait;
use feedback_pipeline::config::IngestConfig;
use feedback_pipeline::ingest::RawProcessor;
use feedback_pipeline::record::{FeedbackRecord, FeedbackSource, Language, RecordFilter};
use feedback_pipeline::{InMemoryStore, RecordStore, StoreError};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts inserts on top of the in-memory store.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    inserts: AtomicUsize,
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn insert(&self, record: FeedbackRecord) -> Result<String, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }
    async fn get_by_id(&self, id: &str) -> Result<Option<FeedbackRecord>, StoreError> {
        self.inner.get_by_id(id).await
    }
    async fn update(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        self.inner.update(record).await
    }
    async fn find(
        &self,
        filter: &RecordFilter,
        limit: Option<usize>,
    ) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.inner.find(filter, limit).await
    }
    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        self.inner.count(filter).await
    }
}

/// Every insert fails.
struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    async fn insert(&self, _record: FeedbackRecord) -> Result<String, StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn get_by_id(&self, _id: &str) -> Result<Option<FeedbackRecord>, StoreError> {
        Ok(None)
    }
    async fn update(&self, _record: &FeedbackRecord) -> Result<(), StoreError> {
        Ok(())
    }
    async fn find(
        &self,
        _filter: &RecordFilter,
        _limit: Option<usize>,
    ) -> Result<Vec<FeedbackRecord>, StoreError> {
        Ok(Vec::new())
    }
    async fn count(&self, _filter: &RecordFilter) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[tokio::test]
async fn short_items_never_reach_the_store() {
    let store = Arc::new(CountingStore::default());
    let p = RawProcessor::new(IngestConfig::default(), store.clone());

    let items: Vec<Value> = vec![
        json!({"content": "ok"}),
        json!({"content": "    abcd   "}),
        json!({"text": ""}),
        json!("not an object"),
    ];
    let out = p.process_batch(&items, &Map::new()).await;
    assert_eq!(out.accepted, 0);
    assert_eq!(out.rejected, 4);
    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    assert!(out.rejection_samples[0].contains("content too short"));
    assert!(!out.success());
}

#[tokio::test]
async fn accepted_records_are_normalized_and_flagged() {
    let store = Arc::new(CountingStore::default());
    let p = RawProcessor::new(IngestConfig::default(), store.clone());

    let items = vec![
        json!({
            "content": "<p>Sync   fails&nbsp;on the <b>tablet</b> app!!!!!!</p>",
            "source_type": "app_store",
            "original_id": 1234,
            "user_info": {"is_vip": true},
            "published_at": "2025-03-01 08:30:00"
        }),
        json!({
            "review_text": "我每次打开应用都会闪退，请尽快修复这个问题",
            "source_platform": "google_play"
        }),
        json!({"content": "!!!!!!!!!!!!!!"}),
    ];
    let mut batch = Map::new();
    batch.insert("batch_id".into(), json!("b-1"));
    let out = p.process_batch(&items, &batch).await;
    assert_eq!(out.accepted, 2, "samples: {:?}", out.rejection_samples);
    assert_eq!(out.rejected, 1);
    assert_eq!(store.inserts.load(Ordering::SeqCst), 2);

    let first = store.get_by_id(&out.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(first.normalized_text, "Sync fails on the tablet app!!!");
    assert_eq!(first.source, FeedbackSource::AppStore);
    assert_eq!(first.original_id.as_deref(), Some("1234"));
    assert_eq!(first.language, Language::En);
    assert!(first.metadata.user.is_vip);
    assert_eq!(first.metadata.batch.get("batch_id"), Some(&json!("b-1")));
    assert!(first.published_at.is_some());
    assert!(first.flags.raw_processed && first.flags.needs_ai_analysis);
    assert!(!first.flags.ai_analyzed);
    assert!(first.enrichment.sentiment.is_none() && first.enrichment.category.is_none());

    let second = store.get_by_id(&out.record_ids[1]).await.unwrap().unwrap();
    assert_eq!(second.language, Language::Zh);

    for id in &out.record_ids {
        let r = store.get_by_id(id).await.unwrap().unwrap();
        assert!((0.1..=1.0).contains(&r.quality_score), "quality {}", r.quality_score);
    }

    let stats = p.processing_stats().await.unwrap();
    assert_eq!((stats.total, stats.awaiting_analysis, stats.analyzed), (2, 2, 0));
    assert_eq!(stats.completion_rate, 0.0);
}

#[tokio::test]
async fn store_failures_become_rejections() {
    let p = RawProcessor::new(IngestConfig::default(), Arc::new(BrokenStore));
    let out = p
        .process_batch(&[json!({"content": "The export button is missing"})], &Map::new())
        .await;
    assert_eq!((out.accepted, out.rejected), (0, 1));
    assert!(out.rejection_samples[0].contains("disk full"));
}

#[tokio::test]
async fn rejection_samples_are_bounded() {
    let cfg = IngestConfig {
        rejection_samples: 3,
        ..IngestConfig::default()
    };
    let p = RawProcessor::new(cfg, Arc::new(InMemoryStore::new()));
    let items: Vec<Value> = (0..8).map(|_| json!({"content": "no"})).collect();
    let out = p.process_batch(&items, &Map::new()).await;
    assert_eq!(out.rejected, 8);
    assert_eq!(out.rejection_samples.len(), 3);
    assert!(out.rejection_samples[2].starts_with("item 2:"));
}
