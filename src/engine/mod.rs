// src/engine/mod.rs
//! Job engine: priority queue + bounded set of concurrently running analysis tasks.
//!
//! One scheduler loop owns the running set. Each iteration it reaps finished tasks, checks
//! the stop flag, and either waits (queue empty or concurrency cap reached) or pops the
//! highest-priority task and spawns it. Waits end early on enqueue/stop notifications or
//! when a running task finishes; the poll intervals are only an upper bound.
//!
//! Stopping is drain-style: no new task starts after the flag is seen, running tasks are
//! awaited.

pub mod runner;
pub mod stats;
pub mod task;

use futures::FutureExt;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::analyze::{AnalyzerGateway, FilterEngine, ModelInfo};
use crate::config::EngineConfig;
use crate::error::{panic_message, PipelineError, TaskError};
use crate::store::RecordStore;
use crate::telemetry::ensure_metrics_described;
pub use runner::Worker;
pub use stats::EngineStats;
use stats::Counters;
pub use task::{
    AnalysisMethod, ProcessingTask, TaskEvent, TaskOutcome, TaskStatus, TaskType,
};
use task::QueuedTask;

const EVENT_CAPACITY: usize = 1024;

/// All known tasks; finished ones are evicted oldest-first past the retention cap.
/// `live` counts pending or running tasks per record id.
#[derive(Default)]
struct Registry {
    tasks: HashMap<String, ProcessingTask>,
    finished: VecDeque<String>,
    live: HashMap<String, usize>,
}

impl Registry {
    fn admit(&mut self, task: ProcessingTask) {
        *self.live.entry(task.record_id.clone()).or_default() += 1;
        self.tasks.insert(task.id.clone(), task);
    }

    fn release(&mut self, record_id: &str) {
        if let Some(n) = self.live.get_mut(record_id) {
            *n -= 1;
            if *n == 0 {
                self.live.remove(record_id);
            }
        }
    }

    fn retire(&mut self, id: &str, retention: usize) {
        self.finished.push_back(id.to_string());
        while self.finished.len() > retention {
            if let Some(old) = self.finished.pop_front() {
                self.tasks.remove(&old);
            }
        }
    }
}

struct Inner {
    cfg: EngineConfig,
    worker: Worker,
    queue: Mutex<BinaryHeap<QueuedTask>>,
    registry: Mutex<Registry>,
    seq: AtomicU64,
    running: AtomicUsize,
    stop: AtomicBool,
    wake: Notify,
    counters: Counters,
    events: broadcast::Sender<TaskEvent>,
}

/// Decrements the running count however the task ends.
struct RunningSlot<'a>(&'a AtomicUsize);

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Inner {
    fn emit(&self, task: &ProcessingTask) {
        // no subscribers is fine
        let _ = self.events.send(TaskEvent::of(task));
    }

    fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    /// Pop the next task and mark it running.
    fn pop_next(&self) -> Option<ProcessingTask> {
        loop {
            // count it as running before it leaves the queue so `is_idle` never sees a gap
            let entry = {
                let mut queue = self.queue.lock();
                let entry = queue.pop()?;
                self.running.fetch_add(1, Ordering::SeqCst);
                entry
            };
            gauge!("engine_queue_depth").set(self.queue_depth() as f64);
            let mut reg = self.registry.lock();
            let started = match reg.tasks.get_mut(&entry.task_id) {
                Some(task) => {
                    if task.transition(TaskStatus::Running) {
                        Some(task.clone())
                    } else {
                        warn!(target: "engine", task = %entry.task_id, status = ?task.status, "queued task not pending, skipped");
                        None
                    }
                }
                None => {
                    warn!(target: "engine", task = %entry.task_id, "queued task missing from registry");
                    None
                }
            };
            match started {
                Some(task) => {
                    self.emit(&task);
                    return Some(task);
                }
                None => {
                    self.running.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
    }

    async fn execute(self: Arc<Self>, task: ProcessingTask) {
        let _slot = RunningSlot(&self.running);
        let result = match AssertUnwindSafe(self.worker.run(&task)).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        };

        let mut reg = self.registry.lock();
        reg.release(&task.record_id);
        let Some(entry) = reg.tasks.get_mut(&task.id) else {
            return;
        };
        match result {
            Ok(outcome) => {
                counter!("engine_analysis_method_total", "method" => outcome.method.as_str())
                    .increment(1);
                counter!("engine_tasks_completed_total").increment(1);
                entry.result = Some(outcome);
                entry.transition(TaskStatus::Completed);
                self.counters.record(true);
            }
            Err(e) => {
                error!(target: "engine", task = %task.id, record = %task.record_id, error = %e, "task failed");
                counter!("engine_tasks_failed_total").increment(1);
                entry.error = Some(e.to_string());
                entry.transition(TaskStatus::Failed);
                self.counters.record(false);
            }
        }
        self.emit(entry);
        reg.retire(&task.id, self.cfg.finished_retention);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub queue_depth: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub is_running: bool,
    pub stats: EngineStats,
}

pub struct JobEngine {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobEngine {
    pub fn new(
        cfg: EngineConfig,
        store: Arc<dyn RecordStore>,
        filter: Arc<FilterEngine>,
        gateway: Arc<AnalyzerGateway>,
    ) -> Self {
        ensure_metrics_described();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut cfg = cfg;
        cfg.max_concurrent = cfg.max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                cfg,
                worker: Worker::new(store, filter, gateway),
                queue: Mutex::new(BinaryHeap::new()),
                registry: Mutex::new(Registry::default()),
                seq: AtomicU64::new(0),
                running: AtomicUsize::new(0),
                stop: AtomicBool::new(false),
                wake: Notify::new(),
                counters: Counters::default(),
                events,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the scheduler loop on the current Tokio runtime. Calling it again is a no-op.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Ok(());
        }
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|e| PipelineError::Engine(format!("no Tokio runtime: {e}")))?;
        self.inner.stop.store(false, Ordering::SeqCst);
        let inner = self.inner.clone();
        *handle = Some(rt.spawn(scheduler_loop(inner)));
        info!(
            target: "engine",
            max_concurrent = self.inner.cfg.max_concurrent,
            "job engine started"
        );
        Ok(())
    }

    /// Signal the loop and wait for it to drain in-flight tasks.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
        handle
            .await
            .map_err(|e| PipelineError::Engine(format!("scheduler loop ended abnormally: {e}")))?;
        info!(target: "engine", "job engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Queue one task per record id; returns the task ids in the same order.
    pub fn enqueue(
        &self,
        record_ids: &[String],
        task_type: TaskType,
        priority: u8,
        model_hint: Option<String>,
    ) -> Vec<String> {
        let mut ids = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            let task = ProcessingTask::new(task_type, record_id.clone(), priority, model_hint.clone());
            let entry = QueuedTask {
                priority: task.priority,
                seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
                task_id: task.id.clone(),
            };
            ids.push(task.id.clone());
            self.inner.emit(&task);
            self.inner.registry.lock().admit(task);
            self.inner.queue.lock().push(entry);
        }
        let depth = self.inner.queue_depth();
        gauge!("engine_queue_depth").set(depth as f64);
        if !ids.is_empty() {
            debug!(target: "engine", count = ids.len(), kind = %task_type, priority, depth, "tasks enqueued");
            self.inner.wake.notify_one();
        }
        ids
    }

    /// Snapshot of a task, while it is still retained.
    pub fn task(&self, id: &str) -> Option<ProcessingTask> {
        self.inner.registry.lock().tasks.get(id).cloned()
    }

    /// True while the record has a pending or running task.
    pub fn has_live_task(&self, record_id: &str) -> bool {
        self.inner.registry.lock().live.contains_key(record_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.counters.snapshot(self.inner.queue_depth())
    }

    pub fn queue_info(&self) -> QueueInfo {
        QueueInfo {
            queue_depth: self.inner.queue_depth(),
            running: self.inner.running.load(Ordering::SeqCst),
            max_concurrent: self.inner.cfg.max_concurrent,
            is_running: self.is_running(),
            stats: self.stats(),
        }
    }

    /// True once nothing is queued and nothing is running.
    pub fn is_idle(&self) -> bool {
        self.inner.queue_depth() == 0 && self.inner.running.load(Ordering::SeqCst) == 0
    }

    pub fn gateway_available(&self) -> bool {
        self.inner.worker.gateway.available()
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.inner.worker.gateway.models()
    }
}

fn log_join(res: Result<(), JoinError>) {
    if let Err(e) = res {
        error!(target: "engine", error = %e, "task unit ended abnormally");
    }
}

async fn scheduler_loop(inner: Arc<Inner>) {
    let idle = Duration::from_millis(inner.cfg.idle_poll_ms);
    let backoff = Duration::from_millis(inner.cfg.backoff_poll_ms);
    let mut running: JoinSet<()> = JoinSet::new();

    loop {
        while let Some(res) = running.try_join_next() {
            log_join(res);
        }
        if inner.stop.load(Ordering::SeqCst) {
            break;
        }

        if running.len() >= inner.cfg.max_concurrent {
            tokio::select! {
                Some(res) = running.join_next() => log_join(res),
                _ = inner.wake.notified() => {}
                _ = tokio::time::sleep(backoff) => {}
            }
            continue;
        }

        match inner.pop_next() {
            Some(task) => {
                debug!(target: "engine", task = %task.id, priority = task.priority, "task started");
                running.spawn(inner.clone().execute(task));
            }
            None => {
                tokio::select! {
                    Some(res) = running.join_next(), if !running.is_empty() => log_join(res),
                    _ = inner.wake.notified() => {}
                    _ = tokio::time::sleep(idle) => {}
                }
            }
        }
    }

    let in_flight = running.len();
    if in_flight > 0 {
        info!(target: "engine", in_flight, "waiting for running tasks");
    }
    while let Some(res) = running.join_next().await {
        log_join(res);
    }
}
