// src/ingest/mod.rs
//! Raw processor: loosely typed collector items in, canonical feedback records out.
//!
//! Items are rejected (never raised) when their content is too short or their quality
//! score falls below the configured floor. Accepted records are inserted into the store
//! with `raw_processed` and `needs_ai_analysis` set and every enrichment field empty.

pub mod normalize;
pub mod quality;
pub mod types;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::counter;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::StoreError;
use crate::record::{
    FeedbackRecord, FeedbackSource, ProcessingAudit, ProcessingFlags, RecordFilter,
    SourceMetadata, UserInfo,
};
use crate::store::RecordStore;
use crate::telemetry::{anon_id, ensure_metrics_described};
pub use normalize::{detect_language, extract_keywords, normalize_text};
pub use quality::quality_score;
pub use types::{BatchOutcome, ProcessingStats, RejectReason, Rejection};

/// Tried in order; the first non-blank string wins.
const CONTENT_FIELDS: &[&str] = &["content", "text", "body", "comment", "review_text"];

const TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

pub struct RawProcessor {
    cfg: IngestConfig,
    store: Arc<dyn RecordStore>,
}

impl RawProcessor {
    pub fn new(cfg: IngestConfig, store: Arc<dyn RecordStore>) -> Self {
        ensure_metrics_described();
        Self { cfg, store }
    }

    /// Validate and normalize one item without touching the store.
    pub fn prepare(&self, raw: &Value, batch: &Map<String, Value>) -> Result<FeedbackRecord, RejectReason> {
        let Value::Object(item) = raw else {
            return Err(RejectReason::NotAnObject);
        };

        let content = extract_content(item);
        let len = content.chars().count();
        if len < self.cfg.min_content_chars {
            return Err(RejectReason::ContentTooShort { len });
        }

        let normalized = normalize_text(content);
        let quality = quality_score(&normalized.text);
        if quality < self.cfg.min_quality {
            return Err(RejectReason::QualityBelowThreshold { score: quality });
        }

        let now = Utc::now();
        let published_at = item
            .get("published_at")
            .and_then(parse_time)
            .or_else(|| item.get("created_at").and_then(parse_time));

        Ok(FeedbackRecord {
            id: None,
            raw_text: content.to_string(),
            language: detect_language(&normalized.text),
            quality_score: quality,
            source: determine_source(item),
            source_platform: str_field(item, "source_platform")
                .unwrap_or("unknown")
                .to_string(),
            original_id: item.get("original_id").and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            url: str_field(item, "url").map(str::to_string),
            metadata: SourceMetadata {
                user: UserInfo::from_value(item.get("user_info")),
                product: object_field(item, "product_info"),
                platform: object_field(item, "platform_metadata"),
                batch: batch.clone(),
            },
            published_at,
            ingested_at: now,
            enrichment: Default::default(),
            flags: ProcessingFlags {
                raw_processed: true,
                needs_ai_analysis: true,
                ..Default::default()
            },
            processing: ProcessingAudit {
                preprocessing_steps: normalized.steps,
                preprocessing_keywords: extract_keywords(&normalized.text),
                preprocessed_at: Some(now),
                ..Default::default()
            },
            normalized_text: normalized.text,
        })
    }

    /// Prepare and insert one item; returns the new record id.
    pub async fn process_one(
        &self,
        raw: &Value,
        batch: &Map<String, Value>,
    ) -> Result<String, RejectReason> {
        let record = self.prepare(raw, batch)?;
        let aid = anon_id(&record.normalized_text);
        let quality = record.quality_score;
        let id = self
            .store
            .insert(record)
            .await
            .map_err(|e| RejectReason::StoreInsertFailed(e.to_string()))?;
        debug!(target: "ingest", %id, content = %aid, quality, "record accepted");
        Ok(id)
    }

    /// Process a whole batch; individual failures become rejections.
    pub async fn process_batch(&self, items: &[Value], batch: &Map<String, Value>) -> BatchOutcome {
        let mut out = BatchOutcome::default();

        for (index, raw) in items.iter().enumerate() {
            match self.process_one(raw, batch).await {
                Ok(id) => {
                    out.accepted += 1;
                    out.record_ids.push(id);
                }
                Err(reason) => {
                    out.rejected += 1;
                    match &reason {
                        RejectReason::StoreInsertFailed(e) => {
                            warn!(target: "ingest", index, error = %e, "store insert failed")
                        }
                        other => debug!(target: "ingest", index, reason = %other, "item rejected"),
                    }
                    if out.rejection_samples.len() < self.cfg.rejection_samples {
                        out.rejection_samples.push(Rejection { index, reason }.to_string());
                    }
                }
            }
        }

        counter!("ingest_accepted_total").increment(out.accepted as u64);
        counter!("ingest_rejected_total").increment(out.rejected as u64);
        info!(
            target: "ingest",
            items = items.len(),
            accepted = out.accepted,
            rejected = out.rejected,
            "batch processed"
        );
        out
    }

    pub async fn processing_stats(&self) -> Result<ProcessingStats, StoreError> {
        let total = self.store.count(&RecordFilter::all()).await?;
        let raw_processed = self
            .store
            .count(&RecordFilter {
                raw_processed: Some(true),
                ..Default::default()
            })
            .await?;
        let awaiting_analysis = self.store.count(&RecordFilter::awaiting_analysis()).await?;
        let analyzed = self
            .store
            .count(&RecordFilter {
                ai_analyzed: Some(true),
                ..Default::default()
            })
            .await?;
        let completion_rate = if total == 0 {
            0.0
        } else {
            analyzed as f64 / total as f64
        };
        Ok(ProcessingStats {
            total,
            raw_processed,
            awaiting_analysis,
            analyzed,
            completion_rate,
        })
    }
}

fn extract_content(item: &Map<String, Value>) -> &str {
    CONTENT_FIELDS
        .iter()
        .filter_map(|f| item.get(*f).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

fn str_field<'a>(item: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn object_field(item: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match item.get(key) {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    }
}

/// App store / Google Play / internal, from `source_type`, then `platform` for aggregators.
pub fn determine_source(item: &Map<String, Value>) -> FeedbackSource {
    let lower = |k: &str| str_field(item, k).unwrap_or_default().to_lowercase();
    let source_type = lower("source_type");
    let platform = lower("platform");

    if source_type.contains("ios") || source_type.contains("app_store") {
        return FeedbackSource::AppStore;
    }
    if source_type.contains("android") || source_type.contains("google_play") {
        return FeedbackSource::GooglePlay;
    }
    if lower("source_platform").contains("qimai") {
        if platform.contains("ios") {
            return FeedbackSource::AppStore;
        }
        if platform.contains("android") {
            return FeedbackSource::GooglePlay;
        }
    }
    FeedbackSource::Internal
}

/// Naive timestamps are taken as UTC; integers are unix seconds.
pub fn parse_time(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|s| DateTime::from_timestamp(s, 0)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in TIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}
