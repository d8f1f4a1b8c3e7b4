// src/record.rs
//! Canonical feedback record flowing through the pipeline.
//!
//! Created by the raw processor, mutated in place by the job engine as enrichment
//! completes, never deleted by the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analyze::filter::FilterDecision;
use crate::engine::task::AnalysisMethod;

/// Sentiment label attached by the heuristic filter or a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Lenient parse of model output; anything unrecognised is neutral.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "正面" | "积极" => Sentiment::Positive,
            "negative" | "neg" | "负面" | "消极" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }

    /// Map a signed intensity in [-1, 1] to a label.
    pub fn from_intensity(score: f64) -> Self {
        if score > 0.3 {
            Sentiment::Positive
        } else if score < -0.3 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

/// Coarse priority label stored on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLabel {
    High,
    Medium,
    Low,
}

impl PriorityLabel {
    /// Heuristic composite score (0..1) → label.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            PriorityLabel::High
        } else if score >= 0.5 {
            PriorityLabel::Medium
        } else {
            PriorityLabel::Low
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "urgent" | "critical" | "p0" | "p1" => Some(PriorityLabel::High),
            "medium" | "normal" | "p2" => Some(PriorityLabel::Medium),
            "low" | "p3" => Some(PriorityLabel::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLabel::High => "high",
            PriorityLabel::Medium => "medium",
            PriorityLabel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
    #[default]
    Unknown,
}

/// Where a piece of feedback originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    AppStore,
    GooglePlay,
    #[default]
    Internal,
}

/// User attributes the filter and the scorer care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserInfo {
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub is_paid_user: bool,
    #[serde(default)]
    pub activity_level: Option<String>,
    #[serde(default)]
    pub feedback_count: u32,
    /// Everything else the collector sent about the user.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl UserInfo {
    /// Tolerant extraction from a loosely typed `user_info` object.
    pub fn from_value(v: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = v else {
            return Self::default();
        };
        let flag = |k: &str| match map.get(k) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            _ => false,
        };
        let feedback_count = match map.get("feedback_count") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0).min(u32::MAX as u64) as u32,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let known = ["is_vip", "is_paid_user", "activity_level", "feedback_count"];
        let extra = map
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            is_vip: flag("is_vip"),
            is_paid_user: flag("is_paid_user"),
            activity_level: map
                .get("activity_level")
                .and_then(Value::as_str)
                .map(|s| s.to_ascii_lowercase()),
            feedback_count,
            extra,
        }
    }

    pub fn is_highly_active(&self) -> bool {
        self.activity_level.as_deref() == Some("high")
    }
}

/// Provenance metadata kept verbatim from the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourceMetadata {
    pub user: UserInfo,
    #[serde(default)]
    pub product: Map<String, Value>,
    #[serde(default)]
    pub platform: Map<String, Value>,
    /// Batch-level metadata supplied by the caller of the ingest operation.
    #[serde(default)]
    pub batch: Map<String, Value>,
}

/// Structured analysis a model may return beyond the basic labels.
///
/// All fields are free-form vocabulary strings; the scorer maps them leniently
/// and falls back to neutral defaults for anything it does not recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeepAnalysis {
    #[serde(default)]
    pub impact_scope: Option<String>,
    #[serde(default)]
    pub user_pain_level: Option<String>,
    #[serde(default)]
    pub impact_frequency: Option<String>,
    /// 0..1
    #[serde(default)]
    pub urgency_score: Option<f64>,
    #[serde(default)]
    pub estimated_timeline: Option<String>,
    #[serde(default)]
    pub technical_complexity: Option<String>,
    #[serde(default)]
    pub implementation_effort: Option<String>,
    #[serde(default)]
    pub business_value: Option<String>,
    #[serde(default)]
    pub competitive_advantage: Option<String>,
    #[serde(default)]
    pub strategic_alignment: Option<String>,
    #[serde(default)]
    pub requirement_priority: Option<String>,
    #[serde(default)]
    pub requirement_category: Option<String>,
    /// 0..1
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub solution_suggestion: Option<String>,
}

/// Enrichment outputs; all empty until the job engine fills them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Enrichment {
    pub sentiment: Option<Sentiment>,
    pub category: Option<String>,
    pub priority: Option<PriorityLabel>,
    pub keywords: Option<Vec<String>>,
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub deep_analysis: Option<DeepAnalysis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProcessingFlags {
    pub raw_processed: bool,
    pub needs_ai_analysis: bool,
    pub ai_analyzed: bool,
    pub sentiment_analyzed: bool,
    pub priority_calculated: bool,
    pub categorized: bool,
}

/// Audit blob describing how the record was processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessingAudit {
    #[serde(default)]
    pub preprocessing_steps: Vec<String>,
    /// Keywords found during raw preprocessing (not an enrichment output).
    #[serde(default)]
    pub preprocessing_keywords: Vec<String>,
    pub preprocessed_at: Option<DateTime<Utc>>,
    pub method: Option<AnalysisMethod>,
    pub model_used: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub analyzer_available: Option<bool>,
    /// Heuristic decision of the most recent analysis attempt.
    pub filter: Option<FilterDecision>,
    /// Error reported by the gateway when the heuristic fallback was used.
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Assigned by the record store on insert.
    pub id: Option<String>,
    pub raw_text: String,
    pub normalized_text: String,
    pub language: Language,
    /// 0..1
    pub quality_score: f64,
    pub source: FeedbackSource,
    pub source_platform: String,
    pub original_id: Option<String>,
    pub url: Option<String>,
    pub metadata: SourceMetadata,
    pub published_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub enrichment: Enrichment,
    pub flags: ProcessingFlags,
    pub processing: ProcessingAudit,
}

impl FeedbackRecord {
    /// Minimal record with the given text; used by tests and by callers that
    /// bypass the raw processor.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: None,
            normalized_text: text.clone(),
            raw_text: text,
            language: Language::Unknown,
            quality_score: 1.0,
            source: FeedbackSource::Internal,
            source_platform: "unknown".to_string(),
            original_id: None,
            url: None,
            metadata: SourceMetadata::default(),
            published_at: None,
            ingested_at: Utc::now(),
            enrichment: Enrichment::default(),
            flags: ProcessingFlags::default(),
            processing: ProcessingAudit::default(),
        }
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.metadata.user = user;
        self
    }

    /// Text used for analysis: normalized if present, raw otherwise.
    pub fn content(&self) -> &str {
        if self.normalized_text.trim().is_empty() {
            &self.raw_text
        } else {
            &self.normalized_text
        }
    }

    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}

/// Flag combination used by `RecordStore::find` / `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFilter {
    pub raw_processed: Option<bool>,
    pub needs_ai_analysis: Option<bool>,
    pub ai_analyzed: Option<bool>,
    /// Only records with fewer analysis attempts than this.
    pub max_attempts: Option<u32>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Records that were ingested but never successfully analysed.
    pub fn awaiting_analysis() -> Self {
        Self {
            needs_ai_analysis: Some(true),
            ai_analyzed: Some(false),
            ..Self::default()
        }
    }

    pub fn matches(&self, r: &FeedbackRecord) -> bool {
        self.raw_processed.map_or(true, |v| r.flags.raw_processed == v)
            && self.needs_ai_analysis.map_or(true, |v| r.flags.needs_ai_analysis == v)
            && self.ai_analyzed.map_or(true, |v| r.flags.ai_analyzed == v)
            && self.max_attempts.map_or(true, |m| r.processing.attempts < m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_info_is_tolerant_to_loose_types() {
        let v = json!({
            "is_vip": "true",
            "is_paid_user": 1,
            "activity_level": "HIGH",
            "feedback_count": "12",
            "nickname": "anna"
        });
        let u = UserInfo::from_value(Some(&v));
        assert!(u.is_vip);
        assert!(u.is_paid_user);
        assert!(u.is_highly_active());
        assert_eq!(u.feedback_count, 12);
        assert_eq!(u.extra.get("nickname"), Some(&json!("anna")));
    }

    #[test]
    fn user_info_defaults_when_missing_or_garbled() {
        assert_eq!(UserInfo::from_value(None), UserInfo::default());
        assert_eq!(UserInfo::from_value(Some(&json!("vip"))), UserInfo::default());
    }

    #[test]
    fn priority_label_thresholds() {
        assert_eq!(PriorityLabel::from_score(0.8), PriorityLabel::High);
        assert_eq!(PriorityLabel::from_score(0.79), PriorityLabel::Medium);
        assert_eq!(PriorityLabel::from_score(0.5), PriorityLabel::Medium);
        assert_eq!(PriorityLabel::from_score(0.49), PriorityLabel::Low);
    }

    #[test]
    fn awaiting_analysis_filter() {
        let mut r = FeedbackRecord::new("hello world");
        r.flags.needs_ai_analysis = true;
        assert!(RecordFilter::awaiting_analysis().matches(&r));
        r.flags.ai_analyzed = true;
        assert!(!RecordFilter::awaiting_analysis().matches(&r));

        r.flags.ai_analyzed = false;
        r.processing.attempts = 3;
        let f = RecordFilter {
            max_attempts: Some(3),
            ..RecordFilter::awaiting_analysis()
        };
        assert!(!f.matches(&r));
    }

    #[test]
    fn sentiment_from_intensity_bands() {
        assert_eq!(Sentiment::from_intensity(-1.0), Sentiment::Negative);
        assert_eq!(Sentiment::from_intensity(0.3), Sentiment::Neutral);
        assert_eq!(Sentiment::from_intensity(0.31), Sentiment::Positive);
    }
}
