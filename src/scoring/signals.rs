// src/scoring/signals.rs
//! Collect the inputs of the priority scorer from an enriched record.
//!
//! Model-supplied deep analysis always wins. Fields it leaves empty are derived from
//! the heuristic enrichment (category, sentiment, priority label, filter dimensions)
//! so that heuristically analysed records still spread across tiers.

use serde::Serialize;

use crate::record::{DeepAnalysis, FeedbackRecord, PriorityLabel, Sentiment};

/// Everything the scorer reads. Pure data, no references into the record.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ScoringSignals {
    pub record_id: String,
    pub excerpt: String,
    pub category: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub deep: DeepAnalysis,
    /// Composite score of the heuristic filter, 0..1.
    pub filter_priority: Option<f64>,
    /// Confidence reported by the filter or the model, 0..1.
    pub upstream_confidence: Option<f64>,
    pub is_vip: bool,
    pub is_paid_user: bool,
}

const EXCERPT_CHARS: usize = 120;

const FREQUENCY_MARKERS: &[(&str, &[&str])] = &[
    ("always", &["every time", "everytime", "always", "constantly", "每次", "总是", "一直"]),
    ("often", &["often", "frequently", "keeps", "经常", "频繁"]),
    ("sometimes", &["sometimes", "occasionally", "有时"]),
    ("rarely", &["rarely", "once", "偶尔"]),
];

impl ScoringSignals {
    pub fn from_record(record: &FeedbackRecord) -> Self {
        let e = &record.enrichment;
        let filter = record.processing.filter.as_ref();
        let content = record.content();

        let mut deep = e.deep_analysis.clone().unwrap_or_default();
        let category = e.category.as_deref().map(|c| c.trim().to_lowercase());
        let filter_urgency = filter.map(|f| f.dimensions.urgency);

        if deep.urgency_score.is_none() {
            let from_label = e.priority.map(|p| match p {
                PriorityLabel::High => 0.85,
                PriorityLabel::Medium => 0.6,
                PriorityLabel::Low => 0.3,
            });
            deep.urgency_score = match (filter_urgency, from_label) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        if deep.estimated_timeline.is_none() {
            deep.estimated_timeline = deep.urgency_score.map(|u| timeline_for(u).to_string());
        }
        if deep.user_pain_level.is_none() {
            deep.user_pain_level =
                pain_for(category.as_deref(), e.sentiment, filter_urgency).map(str::to_string);
        }
        if deep.impact_frequency.is_none() {
            deep.impact_frequency = frequency_in(content).map(str::to_string);
        }
        if deep.business_value.is_none() {
            deep.business_value = category
                .as_deref()
                .map(|c| business_value_for(c).to_string());
        }
        if deep.requirement_priority.is_none() {
            deep.requirement_priority = e.priority.map(|p| {
                match p {
                    PriorityLabel::High => "must_have",
                    PriorityLabel::Medium => "should_have",
                    PriorityLabel::Low => "could_have",
                }
                .to_string()
            });
        }
        if deep.requirement_category.is_none() {
            deep.requirement_category = category
                .as_deref()
                .map(|c| requirement_category_for(c).to_string());
        }

        let upstream_confidence = filter
            .map(|f| f.confidence)
            .or(e.ai_confidence)
            .filter(|c| c.is_finite());

        Self {
            record_id: record.id_or_empty().to_string(),
            excerpt: content.chars().take(EXCERPT_CHARS).collect(),
            category,
            sentiment: e.sentiment,
            deep,
            filter_priority: filter.map(|f| f.priority_score),
            upstream_confidence,
            is_vip: record.metadata.user.is_vip,
            is_paid_user: record.metadata.user.is_paid_user,
        }
    }
}

fn timeline_for(urgency: f64) -> &'static str {
    if urgency >= 0.8 {
        "immediate"
    } else if urgency >= 0.5 {
        "sprint"
    } else if urgency >= 0.3 {
        "quarter"
    } else {
        "roadmap"
    }
}

fn pain_for(
    category: Option<&str>,
    sentiment: Option<Sentiment>,
    urgency: Option<f64>,
) -> Option<&'static str> {
    let negative = sentiment == Some(Sentiment::Negative);
    match category {
        Some("bug") if negative => {
            if urgency.unwrap_or(0.0) >= 0.5 {
                Some("blocker")
            } else {
                Some("major_friction")
            }
        }
        Some("feature") => Some("enhancement"),
        _ if negative => Some("minor_inconvenience"),
        _ => None,
    }
}

fn frequency_in(content: &str) -> Option<&'static str> {
    let lower = content.to_lowercase();
    FREQUENCY_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(name, _)| *name)
}

fn business_value_for(category: &str) -> &'static str {
    match category {
        "bug" | "performance" => "retention",
        "feature" => "acquisition",
        "security" => "compliance",
        _ => "efficiency",
    }
}

fn requirement_category_for(category: &str) -> &'static str {
    match category {
        "bug" => "bug_fix",
        "feature" => "feature_request",
        "integration" => "integration",
        _ => "improvement",
    }
}
