// src/scoring/mod.rs
//! Priority scoring of enriched records.
//!
//! Six dimensions on a 0..100 scale are combined into an overall score, which maps to
//! a tier (P0..P3). Scoring is a pure function of the record: unknown or missing
//! vocabulary falls back to neutral table values, so it never fails.

pub mod signals;
mod tables;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::{ScoringConfig, ScoringWeights, TierThresholds};
use crate::record::FeedbackRecord;
pub use signals::ScoringSignals;
use tables::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    P0,
    P1,
    P2,
    P3,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::P0, Tier::P1, Tier::P2, Tier::P3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::P0 => "P0",
            Tier::P1 => "P1",
            Tier::P2 => "P2",
            Tier::P3 => "P3",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Tier::P0 => "Start development immediately and assign the best available resources",
            Tier::P1 => "Include in the current iteration",
            Tier::P2 => "Add to the product roadmap",
            Tier::P3 => "Park for now and re-evaluate periodically",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dimension scores, 0..100. `effort` is raw: higher means more work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DimensionBreakdown {
    pub impact: f64,
    pub urgency: f64,
    pub effort: f64,
    pub business_value: f64,
    pub strategic: f64,
    pub user_voice: f64,
}

/// Record facts carried along for the action planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreContext {
    pub record_id: String,
    pub excerpt: String,
    pub category: Option<String>,
    pub requirement_category: Option<String>,
    pub impact_scope: Option<String>,
    pub implementation_effort: Option<String>,
    pub technical_complexity: Option<String>,
    pub business_value: Option<String>,
    pub strategic_alignment: Option<String>,
    pub root_cause: Option<String>,
    pub solution_suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityScoreResult {
    pub overall: f64,
    pub tier: Tier,
    pub dimensions: DimensionBreakdown,
    pub expected_roi: f64,
    pub risk_factor: f64,
    pub confidence: f64,
    pub recommendation: String,
    pub estimated_impact_users: u64,
    pub suggested_timeline: String,
    pub deadline_pressure: f64,
    pub context: ScoreContext,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PriorityScorer {
    weights: ScoringWeights,
    tiers: TierThresholds,
}

impl PriorityScorer {
    pub fn new(cfg: &ScoringConfig) -> Self {
        Self {
            weights: cfg.weights,
            tiers: cfg.tiers,
        }
    }

    pub fn score_record(&self, record: &FeedbackRecord) -> PriorityScoreResult {
        self.score(&ScoringSignals::from_record(record))
    }

    /// Sorted by overall score, highest first.
    pub fn score_all(&self, records: &[FeedbackRecord]) -> Vec<PriorityScoreResult> {
        let mut out: Vec<_> = records.iter().map(|r| self.score_record(r)).collect();
        out.sort_by(|a, b| b.overall.total_cmp(&a.overall));
        out
    }

    pub fn tier_for(&self, overall: f64) -> Tier {
        let t = &self.tiers;
        if overall >= t.p0 {
            Tier::P0
        } else if overall >= t.p1 {
            Tier::P1
        } else if overall >= t.p2 {
            Tier::P2
        } else {
            Tier::P3
        }
    }

    pub fn score(&self, s: &ScoringSignals) -> PriorityScoreResult {
        let d = &s.deep;
        let urgency_unit = unit_or(d.urgency_score, 0.5);

        let dims = DimensionBreakdown {
            impact: ((SCOPE.get(d.impact_scope.as_deref()) + PAIN.get(d.user_pain_level.as_deref()))
                / 2.0
                * FREQUENCY.get(d.impact_frequency.as_deref()))
            .min(100.0),
            urgency: (urgency_unit * 100.0 * TIMELINE.get(d.estimated_timeline.as_deref()))
                .min(100.0),
            effort: (COMPLEXITY.get(d.technical_complexity.as_deref())
                + EFFORT.get(d.implementation_effort.as_deref()))
                / 2.0,
            business_value: (BUSINESS_VALUE.get(d.business_value.as_deref())
                * COMPETITIVE.get(d.competitive_advantage.as_deref()))
            .min(100.0),
            strategic: (ALIGNMENT.get(d.strategic_alignment.as_deref())
                + REQUIREMENT_PRIORITY.get(d.requirement_priority.as_deref()))
                / 2.0,
            user_voice: user_voice(s),
        };

        let overall = round_to(self.overall(&dims), 2);
        let tier = self.tier_for(overall);

        let model_confidence = d.confidence_score.filter(|c| c.is_finite());
        let risk = (COMPLEXITY_RISK.get(d.technical_complexity.as_deref())
            + (1.0 - model_confidence.unwrap_or(0.7).clamp(0.0, 1.0)))
            / 2.0;
        let confidences: Vec<f64> = [s.upstream_confidence, model_confidence]
            .into_iter()
            .flatten()
            .map(|c| c.clamp(0.0, 1.0))
            .collect();
        let confidence = if confidences.is_empty() {
            0.5
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        let users = SCOPE_USERS.get(d.impact_scope.as_deref())
            * FREQUENCY_USERS.get(d.impact_frequency.as_deref());
        let pressure =
            (urgency_unit + TIMELINE_PRESSURE.get(d.estimated_timeline.as_deref())) / 2.0;

        let result = PriorityScoreResult {
            overall,
            tier,
            dimensions: DimensionBreakdown {
                impact: round_to(dims.impact, 2),
                urgency: round_to(dims.urgency, 2),
                effort: round_to(dims.effort, 2),
                business_value: round_to(dims.business_value, 2),
                strategic: round_to(dims.strategic, 2),
                user_voice: round_to(dims.user_voice, 2),
            },
            expected_roi: round_to(expected_roi(&dims), 2),
            risk_factor: round_to(risk, 3),
            confidence: round_to(confidence, 3),
            recommendation: tier.recommendation().to_string(),
            estimated_impact_users: users as u64,
            suggested_timeline: suggested_timeline(tier, &dims).to_string(),
            deadline_pressure: round_to(pressure, 3),
            context: ScoreContext {
                record_id: s.record_id.clone(),
                excerpt: s.excerpt.clone(),
                category: s.category.clone(),
                requirement_category: d.requirement_category.clone(),
                impact_scope: d.impact_scope.clone(),
                implementation_effort: d.implementation_effort.clone(),
                technical_complexity: d.technical_complexity.clone(),
                business_value: d.business_value.clone(),
                strategic_alignment: d.strategic_alignment.clone(),
                root_cause: d.root_cause.clone(),
                solution_suggestion: d.solution_suggestion.clone(),
            },
            calculated_at: Utc::now(),
        };
        debug!(
            target: "scoring",
            record = %result.context.record_id,
            overall = result.overall,
            tier = %result.tier,
            "record scored"
        );
        result
    }

    /// Weighted sum with effort inverted; clamped to 0..100.
    fn overall(&self, d: &DimensionBreakdown) -> f64 {
        let w = &self.weights;
        let v = d.impact * w.impact
            + d.urgency * w.urgency
            + (100.0 - d.effort) * w.effort
            + d.business_value * w.business_value
            + d.strategic * w.strategic
            + d.user_voice * w.user_voice;
        if v.is_finite() {
            v.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

fn unit_or(v: Option<f64>, default: f64) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(default).clamp(0.0, 1.0)
}

fn user_voice(s: &ScoringSignals) -> f64 {
    let mut boost = 1.0;
    if s.is_vip {
        boost += 0.3;
    }
    if s.is_paid_user {
        boost += 0.2;
    }
    (unit_or(s.filter_priority, 0.5) * 100.0 * boost).min(100.0)
}

/// `(benefit - cost) / cost`, floored at -1; benefit alone when cost is zero.
pub(crate) fn expected_roi(d: &DimensionBreakdown) -> f64 {
    let benefit = d.business_value * d.impact / 10_000.0;
    let cost = d.effort / 100.0;
    let roi = if cost > 0.0 {
        (benefit - cost) / cost
    } else {
        benefit
    };
    roi.max(-1.0)
}

fn suggested_timeline(tier: Tier, d: &DimensionBreakdown) -> &'static str {
    match tier {
        Tier::P0 if d.urgency >= 80.0 => "immediate (1-3 days)",
        Tier::P0 => "current sprint",
        Tier::P1 if d.effort <= 40.0 => "next sprint",
        Tier::P1 => "this quarter",
        Tier::P2 => "within 2-3 quarters",
        Tier::P3 => "long-term roadmap",
    }
}

fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}
