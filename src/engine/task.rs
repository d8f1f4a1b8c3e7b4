// src/engine/task.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::record::{DeepAnalysis, PriorityLabel, Sentiment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Sentiment,
    Category,
    Priority,
    Keywords,
    Full,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Sentiment => "sentiment",
            TaskType::Category => "category",
            TaskType::Priority => "priority",
            TaskType::Keywords => "keywords",
            TaskType::Full => "full",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentiment" => Ok(TaskType::Sentiment),
            "category" => Ok(TaskType::Category),
            "priority" => Ok(TaskType::Priority),
            "keywords" => Ok(TaskType::Keywords),
            "full" | "full_analysis" => Ok(TaskType::Full),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// `Pending → Running → {Completed | Failed}`; nothing moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_become(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

/// How an enrichment result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Model,
    HeuristicFallback,
    HeuristicOnly,
    ContentEmpty,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMethod::Model => "model",
            AnalysisMethod::HeuristicFallback => "heuristic_fallback",
            AnalysisMethod::HeuristicOnly => "heuristic_only",
            AnalysisMethod::ContentEmpty => "content_empty",
        }
    }
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result payload of a completed task. Single-field tasks only fill their field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub method: AnalysisMethod,
    pub model_used: String,
    pub sentiment: Option<Sentiment>,
    pub category: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub priority: Option<PriorityLabel>,
    pub confidence: Option<f64>,
    pub summary: Option<String>,
    pub suggestions: Vec<String>,
    pub deep_analysis: Option<DeepAnalysis>,
    /// Gateway error that caused a heuristic fallback.
    pub fallback_reason: Option<String>,
    pub latency_ms: Option<u64>,
}

impl TaskOutcome {
    pub(crate) fn empty(method: AnalysisMethod, model_used: impl Into<String>) -> Self {
        Self {
            method,
            model_used: model_used.into(),
            sentiment: None,
            category: None,
            keywords: None,
            priority: None,
            confidence: None,
            summary: None,
            suggestions: Vec::new(),
            deep_analysis: None,
            fallback_reason: None,
            latency_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub id: String,
    pub task_type: TaskType,
    pub record_id: String,
    /// 1..=10, higher runs first.
    pub priority: u8,
    pub model_hint: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<TaskOutcome>,
}

impl ProcessingTask {
    pub fn new(
        task_type: TaskType,
        record_id: impl Into<String>,
        priority: u8,
        model_hint: Option<String>,
    ) -> Self {
        Self {
            id: format!("{}-{}", task_type, uuid::Uuid::new_v4().simple()),
            task_type,
            record_id: record_id.into(),
            priority: priority.clamp(1, 10),
            model_hint,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    /// Move to `next` and stamp the matching timestamp; refuses illegal transitions.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_become(next) {
            return false;
        }
        let now = Utc::now();
        match next {
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => self.completed_at = Some(now),
            TaskStatus::Pending => {}
        }
        self.status = next;
        true
    }
}

/// Status change broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub record_id: String,
    pub priority: u8,
    pub status: TaskStatus,
    pub at: DateTime<Utc>,
}

impl TaskEvent {
    pub(crate) fn of(task: &ProcessingTask) -> Self {
        Self {
            task_id: task.id.clone(),
            record_id: task.record_id.clone(),
            priority: task.priority,
            status: task.status,
            at: Utc::now(),
        }
    }
}

/// Heap entry: higher priority first, then lower enqueue sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedTask {
    pub priority: u8,
    pub seq: u64,
    pub task_id: String,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn heap_pops_by_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        for (seq, p) in [1u8, 9, 5, 9, 2, 7, 7, 3, 9, 1].into_iter().enumerate() {
            heap.push(QueuedTask {
                priority: p,
                seq: seq as u64,
                task_id: format!("t{seq}"),
            });
        }
        let order: Vec<_> = std::iter::from_fn(|| heap.pop()).map(|q| q.task_id).collect();
        assert_eq!(
            order,
            vec!["t1", "t3", "t8", "t5", "t6", "t2", "t7", "t4", "t0", "t9"]
        );
    }

    #[test]
    fn status_is_monotonic() {
        let mut t = ProcessingTask::new(TaskType::Full, "r1", 5, None);
        assert!(!t.transition(TaskStatus::Completed));
        assert!(t.transition(TaskStatus::Running));
        assert!(t.started_at.is_some());
        assert!(!t.transition(TaskStatus::Pending));
        assert!(t.transition(TaskStatus::Failed));
        assert!(!t.transition(TaskStatus::Running));
        assert!(!t.transition(TaskStatus::Completed));
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn priority_is_clamped_and_ids_are_typed() {
        let t = ProcessingTask::new(TaskType::Keywords, "r1", 0, None);
        assert_eq!(t.priority, 1);
        assert!(t.id.starts_with("keywords-"));
        assert_eq!(ProcessingTask::new(TaskType::Full, "r1", 99, None).priority, 10);
        assert_eq!("FULL".parse::<TaskType>().unwrap(), TaskType::Full);
        assert!("everything".parse::<TaskType>().is_err());
    }
}
