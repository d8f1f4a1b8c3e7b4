// src/config/mod.rs
//! Pipeline configuration.
//!
//! Loading order:
//! 1) `$FEEDBACK_PIPELINE_CONFIG` (must exist)
//! 2) `config/pipeline.toml`
//! 3) built-in defaults
//!
//! Every field has a serde default, so a file only needs the keys it changes.

pub mod keywords;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
pub use keywords::{KeywordCategory, KeywordProfile};

pub const ENV_PATH: &str = "FEEDBACK_PIPELINE_CONFIG";
pub const ENV_MAX_CONCURRENT: &str = "PIPELINE_MAX_CONCURRENT";
pub const ENV_ESCALATION_PROBABILITY: &str = "PIPELINE_ESCALATION_PROBABILITY";
const DEFAULT_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub filter: FilterConfig,
    pub engine: EngineConfig,
    pub analyzer: AnalyzerConfig,
    pub scoring: ScoringConfig,
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub min_content_chars: usize,
    pub min_quality: f64,
    /// How many rejection reasons a batch result keeps.
    pub rejection_samples: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_content_chars: 5,
            min_quality: 0.1,
            rejection_samples: 10,
        }
    }
}

/// Weights of the six heuristic dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterWeights {
    pub quality: f64,
    pub sentiment: f64,
    pub relevance: f64,
    pub urgency: f64,
    pub user_value: f64,
    pub novelty: f64,
}

impl Default for FilterWeights {
    fn default() -> Self {
        Self {
            quality: 0.25,
            sentiment: 0.20,
            relevance: 0.20,
            urgency: 0.15,
            user_value: 0.10,
            novelty: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub weights: FilterWeights,
    /// priority >= this always escalates
    pub escalate_priority: f64,
    pub escalate_quality: f64,
    pub escalate_novelty: f64,
    /// quality below this never escalates
    pub reject_quality: f64,
    /// lower bound of the sampled band; the upper bound is `escalate_priority`
    pub sample_floor: f64,
    pub escalation_probability: f64,
    /// Replaces the built-in vocabulary when present.
    pub keywords: Option<KeywordProfile>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            weights: FilterWeights::default(),
            escalate_priority: 0.7,
            escalate_quality: 0.6,
            escalate_novelty: 0.6,
            reject_quality: 0.3,
            sample_floor: 0.4,
            escalation_probability: 0.3,
            keywords: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent: usize,
    pub idle_poll_ms: u64,
    pub backoff_poll_ms: u64,
    pub task_timeout_ms: u64,
    /// Finished tasks kept in the registry for lookup.
    pub finished_retention: usize,
    /// Priority given to `full` tasks for freshly ingested records.
    pub new_record_priority: u8,
    /// `retry_failed` skips records with this many analysis attempts.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            idle_poll_ms: 5_000,
            backoff_poll_ms: 2_000,
            task_timeout_ms: 30_000,
            finished_retention: 1_000,
            new_record_priority: 8,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Real backend calls allowed per UTC day.
    pub daily_limit: u32,
    /// Backend used when a task carries no model hint.
    pub default_model: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            daily_limit: 500,
            default_model: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub impact: f64,
    pub urgency: f64,
    pub effort: f64,
    pub business_value: f64,
    pub strategic: f64,
    pub user_voice: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            impact: 0.25,
            urgency: 0.20,
            effort: 0.15,
            business_value: 0.20,
            strategic: 0.10,
            user_voice: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
    /// Floor of P3; anything below still lands in P3.
    pub p3: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            p0: 80.0,
            p1: 65.0,
            p2: 45.0,
            p3: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub tiers: TierThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub min_score: f64,
    pub max_items: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_score: 45.0,
            max_items: 20,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document and sanitise it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut cfg: PipelineConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Env path, then `config/pipeline.toml`, then defaults; env overrides applied last.
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(&p);
            if !pb.exists() {
                return Err(ConfigError::Missing(p));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Malformed values are ignored rather than failing the load.
    pub fn apply_env_overrides(&mut self) {
        if let Some(n) = std::env::var(ENV_MAX_CONCURRENT)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.engine.max_concurrent = n;
        }
        if let Some(p) = std::env::var(ENV_ESCALATION_PROBABILITY)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            self.filter.escalation_probability = p;
        }
        self.sanitize();
    }

    /// Bring out-of-range values back into a usable shape.
    pub fn sanitize(&mut self) {
        let f = &mut self.filter;
        for v in [
            &mut f.escalate_priority,
            &mut f.escalate_quality,
            &mut f.escalate_novelty,
            &mut f.reject_quality,
            &mut f.sample_floor,
            &mut f.escalation_probability,
        ] {
            *v = clamp_unit(*v);
        }
        if f.sample_floor > f.escalate_priority {
            std::mem::swap(&mut f.sample_floor, &mut f.escalate_priority);
        }
        let w = &mut f.weights;
        for v in [
            &mut w.quality,
            &mut w.sentiment,
            &mut w.relevance,
            &mut w.urgency,
            &mut w.user_value,
            &mut w.novelty,
        ] {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }

        let sw = &mut self.scoring.weights;
        for v in [
            &mut sw.impact,
            &mut sw.urgency,
            &mut sw.effort,
            &mut sw.business_value,
            &mut sw.strategic,
            &mut sw.user_voice,
        ] {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }

        // tiers must be descending P0 > P1 > P2 > P3
        let t = &mut self.scoring.tiers;
        let mut tiers = [t.p0, t.p1, t.p2, t.p3].map(|v| {
            if v.is_finite() {
                v.clamp(0.0, 100.0)
            } else {
                0.0
            }
        });
        tiers.sort_by(|a, b| b.total_cmp(a));
        [t.p0, t.p1, t.p2, t.p3] = tiers;

        let e = &mut self.engine;
        e.max_concurrent = e.max_concurrent.max(1);
        e.idle_poll_ms = e.idle_poll_ms.max(1);
        e.backoff_poll_ms = e.backoff_poll_ms.max(1);
        e.task_timeout_ms = e.task_timeout_ms.max(1);
        e.new_record_priority = e.new_record_priority.clamp(1, 10);
        e.max_attempts = e.max_attempts.max(1);

        if !self.planner.min_score.is_finite() {
            self.planner.min_score = PlannerConfig::default().min_score;
        }
        self.planner.min_score = self.planner.min_score.clamp(0.0, 100.0);
    }

    /// Vocabulary in effect: the configured override or the built-in one.
    pub fn keyword_profile(&self) -> KeywordProfile {
        self.filter.keywords.clone().unwrap_or_default()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
