// tests/pipeline_e2e.rs
use async_trait::async_trait;
use feedback_pipeline::analyze::{Analyzer, AnalyzerGateway, MockAnalyzer, ModelOutput, StdRandom};
use feedback_pipeline::engine::{AnalysisMethod, TaskStatus};
use feedback_pipeline::record::Sentiment;
use feedback_pipeline::scoring::Tier;
use feedback_pipeline::{
    AnalysisError, InMemoryStore, PipelineConfig, PipelineManager, RecordStore,
};
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;

const VIP_CRASH: &str = "App crashes every time I log in, please fix immediately";

/// Registered but every call fails.
struct Offline;

#[async_trait]
impl Analyzer for Offline {
    fn name(&self) -> &str {
        "offline"
    }

    async fn analyze(&self, _text: &str) -> Result<ModelOutput, AnalysisError> {
        Err(AnalysisError::Unavailable("connection refused".into()))
    }
}

/// Registered and available, but blows up mid-call.
struct Crashing;

#[async_trait]
impl Analyzer for Crashing {
    fn name(&self) -> &str {
        "crashing"
    }

    async fn analyze(&self, _text: &str) -> Result<ModelOutput, AnalysisError> {
        panic!("model runtime aborted")
    }
}

fn fast_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.engine.idle_poll_ms = 10;
    cfg.engine.backoff_poll_ms = 10;
    cfg
}

fn manager(cfg: PipelineConfig, store: Arc<InMemoryStore>, gateway: AnalyzerGateway) -> PipelineManager {
    PipelineManager::with_random(cfg, store, gateway, Arc::new(StdRandom::seeded(3))).unwrap()
}

async fn settle(p: &PipelineManager) {
    tokio::time::timeout(Duration::from_secs(10), p.wait_idle(Duration::from_millis(5)))
        .await
        .expect("queue drains");
}

#[tokio::test]
async fn vip_crash_report_without_analyzer() {
    let store = Arc::new(InMemoryStore::new());
    let p = manager(fast_config(), store.clone(), AnalyzerGateway::new(Duration::from_secs(1)));

    let items = vec![
        json!({"content": VIP_CRASH, "user_info": {"is_vip": true}}),
        json!({"content": "ok"}),
    ];
    let res = p.process_incoming(&items, &Map::new(), true).await.unwrap();
    assert!(p.is_initialized(), "lazily initialised");
    assert_eq!((res.accepted, res.rejected), (1, 1));
    assert_eq!(res.task_ids.len(), 1, "no task for the rejected item");
    assert!(res.rejection_samples[0].contains("content too short"));

    settle(&p).await;
    let task = p.engine().task(&res.task_ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.unwrap().method, AnalysisMethod::HeuristicOnly);

    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert!(r.flags.raw_processed && r.flags.ai_analyzed && !r.flags.needs_ai_analysis);
    assert_eq!(r.enrichment.sentiment, Some(Sentiment::Negative));
    assert_eq!(r.processing.method, Some(AnalysisMethod::HeuristicOnly));
    assert_eq!(r.processing.analyzer_available, Some(false));
    assert!(r.processing.filter.as_ref().unwrap().should_escalate);
    assert_eq!(store.len(), 1);

    let scores = p.prioritize().await.unwrap();
    assert_eq!(scores.len(), 1);
    assert!(matches!(scores[0].tier, Tier::P0 | Tier::P1), "tier {}", scores[0].tier);
    assert!((0.0..=100.0).contains(&scores[0].overall));

    let plan = p.plan(&scores, None);
    assert_eq!(plan.total_actions, 1);
    assert_eq!(plan.action_items[0].owner_team, "engineering");

    let status = p.status().await;
    assert!(status.initialized && status.health.engine && status.health.store);
    assert!(!status.gateway_available);
    assert_eq!(status.stats.successful, 1);
    assert_eq!(status.processing.unwrap().analyzed, 1);

    p.shutdown().await.unwrap();
    assert!(!p.status().await.health.engine);
}

#[tokio::test]
async fn mock_backend_marks_records_model_analysed() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = AnalyzerGateway::new(Duration::from_secs(1))
        .with_backend(Arc::new(MockAnalyzer::default()));
    let p = manager(fast_config(), store.clone(), gateway);

    let res = p
        .process_incoming(&[json!({"content": "Dark mode would be nice for night reading"})], &Map::new(), true)
        .await
        .unwrap();
    settle(&p).await;

    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(r.processing.method, Some(AnalysisMethod::Model));
    assert_eq!(r.processing.model_used.as_deref(), Some("mock"));
    assert_eq!(r.enrichment.summary.as_deref(), Some("mock analysis"));
    assert!(r.flags.ai_analyzed);
    assert_eq!(p.available_models()[0].name, "mock");
    p.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_analyses_are_retried_until_attempts_run_out() {
    let store = Arc::new(InMemoryStore::new());
    let mut cfg = fast_config();
    cfg.engine.max_attempts = 2;
    let gateway = AnalyzerGateway::new(Duration::from_secs(1)).with_backend(Arc::new(Offline));
    let p = manager(cfg, store.clone(), gateway);

    let res = p
        .process_incoming(&[json!({"content": "Payment page shows an error after checkout"})], &Map::new(), true)
        .await
        .unwrap();
    settle(&p).await;

    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(r.processing.method, Some(AnalysisMethod::HeuristicFallback));
    assert!(r.flags.needs_ai_analysis && !r.flags.ai_analyzed);
    assert!(r.enrichment.category.is_some(), "heuristic result is still written");
    assert!(r.processing.last_failure.as_deref().unwrap().contains("connection refused"));
    assert_eq!(r.processing.attempts, 1);

    let retry = p.retry_failed(10).await.unwrap();
    assert_eq!(retry.retried, 1);
    settle(&p).await;
    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(r.processing.attempts, 2);

    let retry = p.retry_failed(10).await.unwrap();
    assert_eq!(retry.retried, 0);
    assert!(retry.task_ids.is_empty());
    p.shutdown().await.unwrap();
}

#[tokio::test]
async fn enrichment_can_be_skipped() {
    let store = Arc::new(InMemoryStore::new());
    let p = manager(fast_config(), store.clone(), AnalyzerGateway::new(Duration::from_secs(1)));
    let res = p
        .process_incoming(&[json!({"content": "Search results load slowly on mobile"})], &Map::new(), false)
        .await
        .unwrap();
    assert_eq!(res.accepted, 1);
    assert!(res.task_ids.is_empty());
    assert!(!p.is_initialized());

    let ids = p.trigger_analysis(&res.record_ids, None);
    assert_eq!(ids.len(), 1);
    assert_eq!(p.queue_info().queue_depth, 1);
    p.initialize().await.unwrap();
    settle(&p).await;
    assert_eq!(p.status().await.stats.successful, 1);
    p.shutdown().await.unwrap();
}

#[tokio::test]
async fn backend_panic_falls_back_to_heuristics() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = AnalyzerGateway::new(Duration::from_secs(1)).with_backend(Arc::new(Crashing));
    let p = manager(fast_config(), store.clone(), gateway);

    let items = vec![json!({"content": VIP_CRASH, "user_info": {"is_vip": true}})];
    let res = p.process_incoming(&items, &Map::new(), true).await.unwrap();
    settle(&p).await;

    let task = p.engine().task(&res.task_ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.unwrap().method, AnalysisMethod::HeuristicFallback);

    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(r.processing.method, Some(AnalysisMethod::HeuristicFallback));
    assert_eq!(r.enrichment.sentiment, Some(Sentiment::Negative));
    assert!(r.processing.last_failure.as_deref().unwrap().contains("model runtime aborted"));
    assert!(r.flags.needs_ai_analysis && !r.flags.ai_analyzed);

    let stats = p.status().await.stats;
    assert_eq!((stats.total_processed, stats.successful), (1, 1));
    p.shutdown().await.unwrap();
}

#[tokio::test]
async fn records_with_a_live_task_are_not_retried() {
    let store = Arc::new(InMemoryStore::new());
    let gateway = AnalyzerGateway::new(Duration::from_secs(1)).with_backend(Arc::new(Offline));
    let p = manager(fast_config(), store.clone(), gateway);

    let res = p
        .process_incoming(&[json!({"content": "Notifications arrive twice on Android"})], &Map::new(), false)
        .await
        .unwrap();
    let first = p.trigger_analysis(&res.record_ids, None);
    assert_eq!(first.len(), 1);

    // still pending: the engine has not started
    let retry = p.retry_failed(10).await.unwrap();
    assert_eq!(retry.retried, 0);
    assert_eq!(p.queue_info().queue_depth, 1);

    p.initialize().await.unwrap();
    settle(&p).await;
    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(r.processing.attempts, 1);

    let retry = p.retry_failed(10).await.unwrap();
    assert_eq!(retry.retried, 1);
    // the re-queued task is live until it runs
    let again = p.retry_failed(10).await.unwrap();
    assert_eq!(again.retried, 0);

    settle(&p).await;
    let r = store.get_by_id(&res.record_ids[0]).await.unwrap().unwrap();
    assert_eq!(r.processing.attempts, 2);
    p.shutdown().await.unwrap();
}
