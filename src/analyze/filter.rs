// src/analyze/filter.rs
//! Heuristic filter: cheap six-dimension scoring and the escalation decision.
//!
//! Escalation rules, first match wins:
//! 1. priority >= 0.7 → escalate ("high priority")
//! 2. quality >= 0.6 and novelty >= 0.6 → escalate
//! 3. quality < 0.3 → skip
//! 4. priority in [0.4, 0.7) → escalate with probability 0.3
//! 5. otherwise skip
//!
//! Thresholds and the probability come from `FilterConfig`. The decision is produced even
//! when escalation is declined so its labels can serve as a fallback result.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{FilterConfig, FilterWeights, KeywordProfile};
use crate::error::{ConfigError, FilterError};
use crate::record::{PriorityLabel, Sentiment, UserInfo};
use crate::telemetry::anon_id;

/// Source of uniform draws in [0, 1) for the sampled escalation band.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    /// Reproducible sequence, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_os() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&self) -> f64 {
        self.rng.lock().random::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DimensionScores {
    pub quality: f64,
    /// Signed intensity in [-1, 1]; its absolute value is weighted.
    pub sentiment: f64,
    pub relevance: f64,
    pub urgency: f64,
    pub user_value: f64,
    pub novelty: f64,
}

impl DimensionScores {
    fn check_finite(&self) -> Result<(), FilterError> {
        let dims = [
            ("quality", self.quality),
            ("sentiment", self.sentiment),
            ("relevance", self.relevance),
            ("urgency", self.urgency),
            ("user_value", self.user_value),
            ("novelty", self.novelty),
        ];
        match dims.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(FilterError::NonFinite(name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    HighPriority,
    HighQualityNovel,
    QualityTooLow,
    SampledIn,
    SampledOut,
    PriorityTooLow,
    /// Filter could not run; conservative default used.
    FilterUnavailable,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::HighPriority => "high priority",
            EscalationReason::HighQualityNovel => "high quality and novel",
            EscalationReason::QualityTooLow => "quality too low",
            EscalationReason::SampledIn => "medium priority, sampled for analysis",
            EscalationReason::SampledOut => "medium priority, not sampled",
            EscalationReason::PriorityTooLow => "priority too low",
            EscalationReason::FilterUnavailable => "filter unavailable, default decision",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub dimensions: DimensionScores,
    /// Weighted composite in [0, 1].
    pub priority_score: f64,
    pub should_escalate: bool,
    pub reason: EscalationReason,
    pub sentiment: Sentiment,
    pub category: String,
    pub keywords: Vec<String>,
    pub confidence: f64,
}

impl FilterDecision {
    /// Used whenever the filter itself fails.
    pub fn conservative_default() -> Self {
        Self {
            dimensions: DimensionScores::default(),
            priority_score: 0.5,
            should_escalate: false,
            reason: EscalationReason::FilterUnavailable,
            sentiment: Sentiment::Neutral,
            category: "general".to_string(),
            keywords: Vec::new(),
            confidence: 0.3,
        }
    }

    pub fn priority_label(&self) -> PriorityLabel {
        PriorityLabel::from_score(self.priority_score)
    }
}

/// Vocabulary with the regex patterns compiled once.
struct CompiledProfile {
    profile: KeywordProfile,
    severity: Vec<Regex>,
    novelty: Vec<Regex>,
    emotion_only: Vec<Regex>,
    stopwords: HashSet<String>,
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}")).map_err(|source| ConfigError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl CompiledProfile {
    fn new(mut profile: KeywordProfile) -> Result<Self, ConfigError> {
        let lower = |v: &mut Vec<String>| v.iter_mut().for_each(|s| *s = s.to_lowercase());
        for c in profile.categories.iter_mut() {
            lower(&mut c.terms);
        }
        lower(&mut profile.urgency);
        lower(&mut profile.positive);
        lower(&mut profile.negative);
        lower(&mut profile.product_words);
        lower(&mut profile.specificity_markers);

        Ok(Self {
            severity: compile_all(&profile.severity_patterns)?,
            novelty: compile_all(&profile.novelty_patterns)?,
            emotion_only: compile_all(&profile.emotion_only_patterns)?,
            stopwords: profile.stopwords.iter().map(|s| s.to_lowercase()).collect(),
            profile,
        })
    }
}

/// ASCII terms must sit on word boundaries; anything else is a substring match.
pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if !term.is_ascii() {
        return haystack.contains(term);
    }
    haystack.match_indices(term).any(|(start, m)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + m.len()..].chars().next();
        let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
        !is_word(before) && !is_word(after)
    })
}

fn count_terms(haystack: &str, terms: &[String]) -> usize {
    terms.iter().filter(|t| contains_term(haystack, t)).count()
}

pub struct FilterEngine {
    cfg: FilterConfig,
    vocab: CompiledProfile,
    rng: Arc<dyn RandomSource>,
}

impl FilterEngine {
    /// OS-seeded random source.
    pub fn new(cfg: &FilterConfig) -> Result<Self, ConfigError> {
        Self::with_random(cfg, Arc::new(StdRandom::from_os()))
    }

    pub fn with_random(cfg: &FilterConfig, rng: Arc<dyn RandomSource>) -> Result<Self, ConfigError> {
        let profile = cfg.keywords.clone().unwrap_or_default();
        Ok(Self {
            cfg: cfg.clone(),
            vocab: CompiledProfile::new(profile)?,
            rng,
        })
    }

    pub fn weights(&self) -> &FilterWeights {
        &self.cfg.weights
    }

    /// Score, decide and label one piece of feedback.
    pub fn evaluate(&self, text: &str, user: &UserInfo) -> Result<FilterDecision, FilterError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FilterError::EmptyText);
        }
        let lower = text.to_lowercase();

        let dims = self.score_dimensions(text, &lower, user);
        dims.check_finite()?;
        let priority_score = self.composite(&dims);
        let (should_escalate, reason) = self.decide(&dims, priority_score);

        let decision = FilterDecision {
            priority_score,
            should_escalate,
            reason,
            sentiment: Sentiment::from_intensity(dims.sentiment),
            category: self.category(&lower),
            keywords: self.keywords(&lower),
            confidence: (dims.quality + dims.relevance).min(1.0),
            dimensions: dims,
        };
        debug!(
            target: "filter",
            content = %anon_id(text),
            priority = decision.priority_score,
            escalate = decision.should_escalate,
            reason = %decision.reason,
            "filter decision"
        );
        Ok(decision)
    }

    /// Never fails; a filter error yields the conservative default.
    pub fn evaluate_or_default(&self, text: &str, user: &UserInfo) -> FilterDecision {
        match self.evaluate(text, user) {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "filter", error = %e, "filter failed, using default decision");
                FilterDecision::conservative_default()
            }
        }
    }

    pub fn evaluate_batch(&self, items: &[(&str, &UserInfo)]) -> Vec<FilterDecision> {
        items
            .iter()
            .map(|(text, user)| self.evaluate_or_default(text, user))
            .collect()
    }

    fn score_dimensions(&self, text: &str, lower: &str, user: &UserInfo) -> DimensionScores {
        DimensionScores {
            quality: self.content_quality(text, lower),
            sentiment: self.sentiment_intensity(lower),
            relevance: self.business_relevance(lower),
            urgency: self.urgency(text, lower),
            user_value: user_value(user),
            novelty: self.novelty(text),
        }
    }

    fn content_quality(&self, text: &str, lower: &str) -> f64 {
        let len = text.chars().count();
        if len < 10 {
            return 0.1;
        }
        let p = &self.vocab.profile;
        let mut score = 0.0;

        if (50..=500).contains(&len) {
            score += 0.3;
        } else if (20..50).contains(&len) || (501..=1000).contains(&len) {
            score += 0.2;
        } else if len > 1000 {
            score += 0.1;
        }
        if count_terms(lower, &p.specificity_markers) > 0 {
            score += 0.2;
        }
        if !self.vocab.emotion_only.iter().any(|re| re.is_match(text)) {
            score += 0.2;
        }
        if count_terms(lower, &p.product_words) > 0 {
            score += 0.3;
        }
        f64::min(score, 1.0)
    }

    fn sentiment_intensity(&self, lower: &str) -> f64 {
        let p = &self.vocab.profile;
        let pos = count_terms(lower, &p.positive) as f64;
        let neg = count_terms(lower, &p.negative) as f64;
        if pos + neg == 0.0 {
            return 0.0;
        }
        (pos - neg) / (pos + neg)
    }

    fn business_relevance(&self, lower: &str) -> f64 {
        let hits = self
            .vocab
            .profile
            .categories
            .iter()
            .filter(|c| count_terms(lower, &c.terms) > 0)
            .count();
        f64::min(hits as f64 * 0.2, 1.0)
    }

    fn urgency(&self, text: &str, lower: &str) -> f64 {
        let keywords = count_terms(lower, &self.vocab.profile.urgency) as f64;
        let severity = self
            .vocab
            .severity
            .iter()
            .filter(|re| re.is_match(text))
            .count() as f64;
        f64::min(keywords * 0.3 + severity * 0.2, 1.0)
    }

    fn novelty(&self, text: &str) -> f64 {
        if self.vocab.novelty.iter().any(|re| re.is_match(text)) {
            0.8
        } else {
            0.5
        }
    }

    /// Weighted sum of the six dimensions, clamped to [0, 1].
    pub fn composite(&self, d: &DimensionScores) -> f64 {
        let w = &self.cfg.weights;
        let sum = d.quality * w.quality
            + d.sentiment.abs() * w.sentiment
            + d.relevance * w.relevance
            + d.urgency * w.urgency
            + d.user_value * w.user_value
            + d.novelty * w.novelty;
        sum.clamp(0.0, 1.0)
    }

    /// Apply the ordered escalation rules.
    pub fn decide(&self, d: &DimensionScores, priority: f64) -> (bool, EscalationReason) {
        let c = &self.cfg;
        if priority >= c.escalate_priority {
            return (true, EscalationReason::HighPriority);
        }
        if d.quality >= c.escalate_quality && d.novelty >= c.escalate_novelty {
            return (true, EscalationReason::HighQualityNovel);
        }
        if d.quality < c.reject_quality {
            return (false, EscalationReason::QualityTooLow);
        }
        if priority >= c.sample_floor {
            return if self.rng.next_unit() < c.escalation_probability {
                (true, EscalationReason::SampledIn)
            } else {
                (false, EscalationReason::SampledOut)
            };
        }
        (false, EscalationReason::PriorityTooLow)
    }

    fn category(&self, lower: &str) -> String {
        self.vocab
            .profile
            .categories
            .iter()
            .find(|c| count_terms(lower, &c.terms) > 0)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "general".to_string())
    }

    fn keywords(&self, lower: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
            .map(|w| w.trim_matches('\''))
            .filter(|w| w.chars().count() > 2 && !self.vocab.stopwords.contains(*w))
            .filter(|w| seen.insert(w.to_string()))
            .take(10)
            .map(str::to_string)
            .collect()
    }
}

fn user_value(user: &UserInfo) -> f64 {
    let mut score: f64 = 0.5;
    if user.is_vip {
        score += 0.3;
    }
    if user.is_paid_user {
        score += 0.2;
    }
    if user.is_highly_active() {
        score += 0.2;
    }
    if user.feedback_count > 10 {
        score += 0.1;
    } else if user.feedback_count > 5 {
        score += 0.05;
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always returns the same draw.
    struct Fixed(f64);
    impl RandomSource for Fixed {
        fn next_unit(&self) -> f64 {
            self.0
        }
    }

    fn engine(draw: f64) -> FilterEngine {
        FilterEngine::with_random(&FilterConfig::default(), Arc::new(Fixed(draw))).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn term_matching_respects_word_boundaries() {
        assert!(contains_term("it crashes on start", "crashes"));
        assert!(!contains_term("it crashes on start", "crash"));
        assert!(contains_term("please log in again", "log in"));
        assert!(!contains_term("catalog input", "log in"));
        assert!(contains_term("应用闪退了", "闪退"));
    }

    #[test]
    fn vip_crash_report_escalates_on_priority() {
        let e = engine(0.99);
        let vip = UserInfo {
            is_vip: true,
            ..Default::default()
        };
        let d = e
            .evaluate("App crashes every time I log in, please fix immediately", &vip)
            .unwrap();
        assert!(approx(d.dimensions.quality, 1.0));
        assert!(approx(d.dimensions.sentiment, -1.0));
        assert!(approx(d.dimensions.relevance, 0.4));
        assert!(approx(d.dimensions.urgency, 0.5));
        assert!(approx(d.dimensions.user_value, 0.8));
        assert!(approx(d.priority_score, 0.735));
        assert!(d.should_escalate);
        assert_eq!(d.reason, EscalationReason::HighPriority);
        assert_eq!(d.sentiment, Sentiment::Negative);
        assert_eq!(d.category, "bug");
        assert!(d.keywords.contains(&"crashes".to_string()));
        assert_eq!(d.priority_label(), PriorityLabel::Medium);
    }

    #[test]
    fn very_short_text_is_low_quality_and_skipped() {
        let e = engine(0.0);
        let d = e.evaluate("meh", &UserInfo::default()).unwrap();
        assert!(approx(d.dimensions.quality, 0.1));
        assert!(!d.should_escalate);
        assert_eq!(d.reason, EscalationReason::QualityTooLow);
    }

    #[test]
    fn mid_band_follows_the_draw() {
        let text = "Why does the export screen feel so useless compared to before";
        let d_in = engine(0.1).evaluate(text, &UserInfo::default()).unwrap();
        let d_out = engine(0.9).evaluate(text, &UserInfo::default()).unwrap();
        assert!(d_in.priority_score >= 0.4 && d_in.priority_score < 0.7);
        assert_eq!(d_in.reason, EscalationReason::SampledIn);
        assert_eq!(d_out.reason, EscalationReason::SampledOut);
    }

    #[test]
    fn specific_detail_raises_novelty() {
        let e = engine(0.9);
        let d = e
            .evaluate(
                "After version 3.2.1 tapping the save button on the settings page does nothing",
                &UserInfo::default(),
            )
            .unwrap();
        assert!(approx(d.dimensions.novelty, 0.8));
        assert!(d.should_escalate);
    }

    #[test]
    fn empty_text_errors_and_default_is_conservative() {
        let e = engine(0.0);
        assert_eq!(
            e.evaluate("   ", &UserInfo::default()).unwrap_err(),
            FilterError::EmptyText
        );
        let d = e.evaluate_or_default("", &UserInfo::default());
        assert_eq!(d, FilterDecision::conservative_default());
        assert_eq!(d.category, "general");
        assert!(approx(d.confidence, 0.3));
    }

    #[test]
    fn user_value_tiers() {
        let u = UserInfo {
            is_vip: true,
            is_paid_user: true,
            activity_level: Some("high".into()),
            feedback_count: 20,
            ..Default::default()
        };
        assert!(approx(user_value(&u), 1.0));
        let u = UserInfo {
            feedback_count: 6,
            ..Default::default()
        };
        assert!(approx(user_value(&u), 0.55));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let mut cfg = FilterConfig::default();
        let mut profile = KeywordProfile::default();
        profile.novelty_patterns.push("(unclosed".into());
        cfg.keywords = Some(profile);
        assert!(matches!(
            FilterEngine::new(&cfg),
            Err(ConfigError::Pattern { .. })
        ));
    }
}
