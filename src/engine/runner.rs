// src/engine/runner.rs
//! Per-task execution: fetch the record, run the filter, try the gateway, fall back,
//! write the result back.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::task::{AnalysisMethod, ProcessingTask, TaskOutcome, TaskType};
use crate::analyze::{Analysis, AnalyzerGateway, FilterDecision, FilterEngine};
use crate::error::{AnalysisError, TaskError};
use crate::record::{FeedbackRecord, PriorityLabel, Sentiment};
use crate::store::RecordStore;
use crate::telemetry::anon_id;

/// Everything a running task needs; shared by all tasks of one engine.
pub struct Worker {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) filter: Arc<FilterEngine>,
    pub(crate) gateway: Arc<AnalyzerGateway>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        filter: Arc<FilterEngine>,
        gateway: Arc<AnalyzerGateway>,
    ) -> Self {
        Self {
            store,
            filter,
            gateway,
        }
    }

    /// Gateway failures are absorbed here; only record fetch/persist problems are errors.
    pub async fn run(&self, task: &ProcessingTask) -> Result<TaskOutcome, TaskError> {
        let mut record = self
            .store
            .get_by_id(&task.record_id)
            .await?
            .ok_or_else(|| TaskError::RecordNotFound(task.record_id.clone()))?;

        let available = self.gateway.available_for(task.model_hint.as_deref());
        let content = record.content().trim().to_string();
        if content.is_empty() {
            let outcome = empty_content_outcome();
            warn!(target: "engine", task = %task.id, record = %task.record_id, "record has no content");
            apply_outcome(&mut record, task.task_type, &outcome, None, available);
            self.store.update(&record).await?;
            return Ok(outcome);
        }

        let decision = self
            .filter
            .evaluate_or_default(&content, &record.metadata.user);

        let outcome = if available {
            match self.gateway.analyze(&content, task.model_hint.as_deref()).await {
                Ok(analysis) => from_model(task.task_type, analysis, &decision),
                Err(e) => {
                    warn!(
                        target: "engine",
                        task = %task.id,
                        content = %anon_id(&content),
                        error = %e,
                        "gateway failed, using heuristic fallback"
                    );
                    from_decision(
                        task.task_type,
                        &decision,
                        AnalysisMethod::HeuristicFallback,
                        Some(&e),
                    )
                }
            }
        } else {
            from_decision(task.task_type, &decision, AnalysisMethod::HeuristicOnly, None)
        };

        apply_outcome(
            &mut record,
            task.task_type,
            &outcome,
            Some(decision),
            available,
        );
        self.store.update(&record).await?;
        debug!(
            target: "engine",
            task = %task.id,
            kind = %task.task_type,
            method = %outcome.method,
            "task result written"
        );
        Ok(outcome)
    }
}

fn empty_content_outcome() -> TaskOutcome {
    TaskOutcome {
        sentiment: Some(Sentiment::Neutral),
        category: Some("unknown".to_string()),
        keywords: Some(Vec::new()),
        priority: Some(PriorityLabel::Low),
        confidence: Some(0.0),
        summary: Some("feedback content is empty, nothing to analyse".to_string()),
        ..TaskOutcome::empty(AnalysisMethod::ContentEmpty, "none")
    }
}

/// Keep only the field a single-purpose task is responsible for.
fn narrow(kind: TaskType, mut o: TaskOutcome) -> TaskOutcome {
    match kind {
        TaskType::Full => return o,
        TaskType::Sentiment => {
            o.category = None;
            o.keywords = None;
            o.priority = None;
        }
        TaskType::Category => {
            o.sentiment = None;
            o.keywords = None;
            o.priority = None;
        }
        TaskType::Priority => {
            o.sentiment = None;
            o.category = None;
            o.keywords = None;
        }
        TaskType::Keywords => {
            o.sentiment = None;
            o.category = None;
            o.priority = None;
        }
    }
    o.confidence = None;
    o.summary = None;
    o.suggestions.clear();
    o.deep_analysis = None;
    o
}

/// Model output with gaps filled from the heuristic decision.
pub(crate) fn from_model(kind: TaskType, a: Analysis, d: &FilterDecision) -> TaskOutcome {
    let out = a.output;
    let category = out
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| d.category.clone());
    let outcome = TaskOutcome {
        method: AnalysisMethod::Model,
        model_used: a.model_used,
        sentiment: Some(out.sentiment.unwrap_or(d.sentiment)),
        category: Some(category),
        keywords: Some(out.keywords.unwrap_or_else(|| d.keywords.clone())),
        priority: Some(out.priority.unwrap_or_else(|| d.priority_label())),
        confidence: Some(
            out.confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(d.confidence),
        ),
        summary: out.summary,
        suggestions: out.suggestions,
        deep_analysis: out.deep_analysis,
        fallback_reason: None,
        latency_ms: Some(a.latency.as_millis() as u64),
    };
    narrow(kind, outcome)
}

pub(crate) fn from_decision(
    kind: TaskType,
    d: &FilterDecision,
    method: AnalysisMethod,
    error: Option<&AnalysisError>,
) -> TaskOutcome {
    let outcome = TaskOutcome {
        sentiment: Some(d.sentiment),
        category: Some(d.category.clone()),
        keywords: Some(d.keywords.clone()),
        priority: Some(d.priority_label()),
        confidence: Some(d.confidence),
        summary: Some(format!("heuristic analysis: {}", d.reason)),
        fallback_reason: error.map(|e| e.to_string()),
        ..TaskOutcome::empty(method, "heuristic_filter")
    };
    narrow(kind, outcome)
}

/// Write enrichment, flags and the audit blob onto the record.
pub(crate) fn apply_outcome(
    record: &mut FeedbackRecord,
    kind: TaskType,
    o: &TaskOutcome,
    decision: Option<FilterDecision>,
    analyzer_available: bool,
) {
    let e = &mut record.enrichment;
    if let Some(s) = o.sentiment {
        e.sentiment = Some(s);
        record.flags.sentiment_analyzed = true;
    }
    if let Some(c) = &o.category {
        e.category = Some(c.clone());
        record.flags.categorized = true;
    }
    if let Some(p) = o.priority {
        e.priority = Some(p);
        record.flags.priority_calculated = true;
    }
    if let Some(k) = &o.keywords {
        e.keywords = Some(k.clone());
    }

    if kind == TaskType::Full {
        e.ai_confidence = o.confidence;
        e.summary = o.summary.clone();
        e.suggestions = o.suggestions.clone();
        if o.deep_analysis.is_some() {
            e.deep_analysis = o.deep_analysis.clone();
        }
        // a failed gateway call leaves the record eligible for retry
        if o.method != AnalysisMethod::HeuristicFallback {
            record.flags.ai_analyzed = true;
            record.flags.needs_ai_analysis = false;
        }
    }

    let p = &mut record.processing;
    p.method = Some(o.method);
    p.model_used = Some(o.model_used.clone());
    p.analyzed_at = Some(Utc::now());
    p.analyzer_available = Some(analyzer_available);
    if decision.is_some() {
        p.filter = decision;
    }
    p.fallback_reason = o.fallback_reason.clone();
    p.attempts = p.attempts.saturating_add(1);
    p.last_failure = o.fallback_reason.clone();
}
