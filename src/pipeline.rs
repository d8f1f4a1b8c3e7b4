// src/pipeline.rs
//! Composition root: raw processor + job engine + scorer + planner over one record store.
//!
//! Construct one `PipelineManager` at process start and share it by reference.
//! `initialize` / `shutdown` bracket the scheduler loop; everything else is safe to call
//! at any time.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::analyze::{AnalyzerGateway, FilterEngine, ModelInfo, RandomSource, StdRandom};
use crate::config::PipelineConfig;
use crate::engine::{EngineStats, JobEngine, QueueInfo, TaskType};
use crate::error::PipelineError;
use crate::ingest::{BatchOutcome, ProcessingStats, RawProcessor};
use crate::planner::{ActionPlan, ActionPlanner, PlanOptions};
use crate::record::{FeedbackRecord, RecordFilter};
use crate::scoring::{PriorityScoreResult, PriorityScorer};
use crate::store::RecordStore;

/// Result of one `process_incoming` call.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub accepted: usize,
    pub rejected: usize,
    pub record_ids: Vec<String>,
    pub task_ids: Vec<String>,
    pub rejection_samples: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub store: bool,
    pub engine: bool,
    pub analyzer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub initialized: bool,
    pub queue: QueueInfo,
    pub gateway_available: bool,
    pub stats: EngineStats,
    /// `None` when the store could not be counted.
    pub processing: Option<ProcessingStats>,
    pub health: Health,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryOutcome {
    pub retried: usize,
    pub task_ids: Vec<String>,
}

pub struct PipelineManager {
    cfg: PipelineConfig,
    store: Arc<dyn RecordStore>,
    processor: RawProcessor,
    engine: JobEngine,
    scorer: PriorityScorer,
    planner: ActionPlanner,
    initialized: AtomicBool,
}

impl PipelineManager {
    pub fn new(
        cfg: PipelineConfig,
        store: Arc<dyn RecordStore>,
        gateway: AnalyzerGateway,
    ) -> Result<Self, PipelineError> {
        Self::with_random(cfg, store, gateway, Arc::new(StdRandom::from_os()))
    }

    /// Same as `new` with an explicit source for the escalation sampling.
    pub fn with_random(
        cfg: PipelineConfig,
        store: Arc<dyn RecordStore>,
        mut gateway: AnalyzerGateway,
        rng: Arc<dyn RandomSource>,
    ) -> Result<Self, PipelineError> {
        if let Some(name) = cfg.analyzer.default_model.as_deref() {
            if !gateway.set_default(name) {
                warn!(target: "pipeline", model = name, "configured default model is not registered");
            }
        }
        let filter = FilterEngine::with_random(&cfg.filter, rng)?;
        let engine = JobEngine::new(
            cfg.engine.clone(),
            store.clone(),
            Arc::new(filter),
            Arc::new(gateway),
        );
        Ok(Self {
            processor: RawProcessor::new(cfg.ingest.clone(), store.clone()),
            scorer: PriorityScorer::new(&cfg.scoring),
            planner: ActionPlanner::new(&cfg.planner),
            engine,
            store,
            cfg,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn engine(&self) -> &JobEngine {
        &self.engine
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Check the store and start the scheduler loop. A second call is a no-op.
    pub async fn initialize(&self) -> Result<(), PipelineError> {
        if self.is_initialized() {
            return Ok(());
        }
        self.store.health_check().await?;
        self.engine.start()?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            target: "pipeline",
            analyzer = self.engine.gateway_available(),
            "pipeline initialized"
        );
        Ok(())
    }

    /// Stop the scheduler and wait for running tasks. Queued tasks stay queued.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        self.engine.stop().await?;
        self.initialized.store(false, Ordering::SeqCst);
        info!(target: "pipeline", pending = self.engine.stats().pending, "pipeline shut down");
        Ok(())
    }

    /// Ingest a batch and, when `enrich` is set, queue a `full` task per accepted record.
    pub async fn process_incoming(
        &self,
        items: &[Value],
        metadata: &Map<String, Value>,
        enrich: bool,
    ) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        if enrich && !self.is_initialized() {
            self.initialize().await?;
        }
        let outcome = self.processor.process_batch(items, metadata).await;
        let task_ids = if enrich {
            self.engine.enqueue(
                &outcome.record_ids,
                TaskType::Full,
                self.cfg.engine.new_record_priority,
                None,
            )
        } else {
            Vec::new()
        };
        let result = PipelineResult {
            accepted: outcome.accepted,
            rejected: outcome.rejected,
            record_ids: outcome.record_ids,
            task_ids,
            rejection_samples: outcome.rejection_samples,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            target: "pipeline",
            accepted = result.accepted,
            rejected = result.rejected,
            tasks = result.task_ids.len(),
            elapsed_ms = result.elapsed_ms,
            "incoming batch handled"
        );
        Ok(result)
    }

    /// Ingest only; nothing is queued.
    pub async fn process_raw_only(&self, items: &[Value], metadata: &Map<String, Value>) -> BatchOutcome {
        self.processor.process_batch(items, metadata).await
    }

    pub fn enqueue(
        &self,
        record_ids: &[String],
        task_type: TaskType,
        priority: u8,
        model_hint: Option<String>,
    ) -> Vec<String> {
        self.engine.enqueue(record_ids, task_type, priority, model_hint)
    }

    /// Queue `full` analysis for existing records.
    pub fn trigger_analysis(&self, record_ids: &[String], model_hint: Option<String>) -> Vec<String> {
        self.engine.enqueue(
            record_ids,
            TaskType::Full,
            self.cfg.engine.new_record_priority,
            model_hint,
        )
    }

    /// Re-queue up to `limit` records still waiting for a successful analysis.
    /// Records that already used up `max_attempts`, or still have a pending or running
    /// task, are left alone.
    pub async fn retry_failed(&self, limit: usize) -> Result<RetryOutcome, PipelineError> {
        let filter = RecordFilter {
            max_attempts: Some(self.cfg.engine.max_attempts),
            ..RecordFilter::awaiting_analysis()
        };
        let ids: Vec<String> = self
            .store
            .find(&filter, None)
            .await?
            .into_iter()
            .filter_map(|r| r.id)
            .filter(|id| !self.engine.has_live_task(id))
            .take(limit)
            .collect();
        if ids.is_empty() {
            info!(target: "pipeline", "nothing to retry");
            return Ok(RetryOutcome::default());
        }
        let task_ids = self.trigger_analysis(&ids, None);
        info!(target: "pipeline", retried = ids.len(), "analysis re-queued");
        Ok(RetryOutcome {
            retried: ids.len(),
            task_ids,
        })
    }

    pub fn queue_info(&self) -> QueueInfo {
        self.engine.queue_info()
    }

    pub fn available_models(&self) -> Vec<ModelInfo> {
        self.engine.models()
    }

    pub async fn status(&self) -> PipelineStatus {
        let store_ok = self.store.health_check().await.is_ok();
        let processing = match self.processor.processing_stats().await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(target: "pipeline", error = %e, "processing stats unavailable");
                None
            }
        };
        let gateway_available = self.engine.gateway_available();
        PipelineStatus {
            initialized: self.is_initialized(),
            queue: self.engine.queue_info(),
            gateway_available,
            stats: self.engine.stats(),
            processing,
            health: Health {
                store: store_ok,
                engine: self.engine.is_running(),
                analyzer: gateway_available,
            },
        }
    }

    /// Resolve once the queue is empty and no task is running, polling every `poll`.
    pub async fn wait_idle(&self, poll: Duration) {
        while !self.engine.is_idle() {
            tokio::time::sleep(poll).await;
        }
    }

    /// Score every record that has a priority label, highest first.
    pub async fn prioritize(&self) -> Result<Vec<PriorityScoreResult>, PipelineError> {
        let records: Vec<FeedbackRecord> = self
            .store
            .find(&RecordFilter::all(), None)
            .await?
            .into_iter()
            .filter(|r| r.flags.priority_calculated)
            .collect();
        Ok(self.scorer.score_all(&records))
    }

    pub fn plan(&self, scores: &[PriorityScoreResult], opts: Option<PlanOptions>) -> ActionPlan {
        match opts {
            Some(o) => self.planner.plan_with(scores, &o),
            None => self.planner.plan(scores),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn manager(store: Arc<InMemoryStore>) -> PipelineManager {
        let mut cfg = PipelineConfig::default();
        cfg.engine.idle_poll_ms = 20;
        cfg.engine.backoff_poll_ms = 20;
        PipelineManager::with_random(
            cfg,
            store,
            AnalyzerGateway::new(Duration::from_secs(1)),
            Arc::new(StdRandom::seeded(7)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn initialize_is_idempotent_and_shutdown_stops() {
        let m = manager(Arc::new(InMemoryStore::new()));
        m.initialize().await.unwrap();
        m.initialize().await.unwrap();
        assert!(m.status().await.health.engine);
        m.shutdown().await.unwrap();
        let s = m.status().await;
        assert!(!s.initialized && !s.health.engine);
        assert!(s.health.store);
    }

    #[tokio::test]
    async fn raw_only_queues_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone());
        let out = m
            .process_raw_only(&[json!({"content": "The sync button does nothing on tablets"})], &Map::new())
            .await;
        assert_eq!(out.accepted, 1);
        assert_eq!(m.queue_info().queue_depth, 0);
        assert!(!m.is_initialized());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_default_model_is_ignored() {
        let mut cfg = PipelineConfig::default();
        cfg.analyzer.default_model = Some("missing".into());
        let m = PipelineManager::new(
            cfg,
            Arc::new(InMemoryStore::new()),
            AnalyzerGateway::new(Duration::from_secs(1)),
        )
        .unwrap();
        assert!(m.available_models().is_empty());
    }
}
