// src/analyze/gateway.rs
//! Analyzer gateway: named model backends behind one call with a timeout.
//!
//! A bad backend never takes the caller down. A missing or unavailable backend, a timeout,
//! a model error and a panic inside the backend all come back as `AnalysisError`, and the job
//! engine falls back to the heuristic decision for each of them.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{panic_message, AnalysisError};
use crate::record::{DeepAnalysis, PriorityLabel, Sentiment};
use crate::telemetry::anon_id;

pub const ENV_TEST_MODE: &str = "ANALYZER_TEST_MODE";

/// What a backend returns. Every field may be missing; callers fill the gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelOutput {
    pub sentiment: Option<Sentiment>,
    pub category: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub priority: Option<PriorityLabel>,
    pub confidence: Option<f64>,
    pub summary: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub deep_analysis: Option<DeepAnalysis>,
}

/// Gateway result for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub output: ModelOutput,
    pub model_used: String,
    pub latency: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub available: bool,
    pub is_default: bool,
}

/// One model backend.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool {
        true
    }

    async fn analyze(&self, text: &str) -> Result<ModelOutput, AnalysisError>;
}

pub type DynAnalyzer = Arc<dyn Analyzer>;

pub struct AnalyzerGateway {
    backends: Vec<DynAnalyzer>,
    default: Option<usize>,
    timeout: Duration,
}

impl AnalyzerGateway {
    /// Gateway with no backends; `available()` is false.
    pub fn new(timeout: Duration) -> Self {
        Self {
            backends: Vec::new(),
            default: None,
            timeout,
        }
    }

    /// The first registered backend becomes the default.
    pub fn with_backend(mut self, backend: DynAnalyzer) -> Self {
        self.register(backend);
        self
    }

    pub fn register(&mut self, backend: DynAnalyzer) {
        if let Some(i) = self.index_of(backend.name()) {
            warn!(target: "gateway", model = backend.name(), "backend re-registered, replacing");
            self.backends[i] = backend;
            return;
        }
        self.backends.push(backend);
        if self.default.is_none() {
            self.default = Some(self.backends.len() - 1);
        }
    }

    /// Returns false when no backend has that name.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.index_of(name) {
            Some(i) => {
                self.default = Some(i);
                true
            }
            None => false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.backends
            .iter()
            .position(|b| b.name().eq_ignore_ascii_case(name))
    }

    /// True when the default backend exists and reports itself available.
    pub fn available(&self) -> bool {
        self.available_for(None)
    }

    /// Availability of the backend a call with this hint would use.
    pub fn available_for(&self, hint: Option<&str>) -> bool {
        self.pick(hint).is_some_and(|b| b.available())
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.backends
            .iter()
            .enumerate()
            .map(|(i, b)| ModelInfo {
                name: b.name().to_string(),
                available: b.available(),
                is_default: self.default == Some(i),
            })
            .collect()
    }

    /// Hinted backend if registered, else the default.
    fn pick(&self, hint: Option<&str>) -> Option<&DynAnalyzer> {
        hint.map(str::trim)
            .filter(|h| !h.is_empty())
            .and_then(|h| self.index_of(h))
            .or(self.default)
            .and_then(|i| self.backends.get(i))
    }

    fn select(&self, hint: Option<&str>) -> Result<&DynAnalyzer, AnalysisError> {
        if let Some(h) = hint.map(str::trim).filter(|h| !h.is_empty()) {
            if self.index_of(h).is_none() {
                warn!(target: "gateway", hint = h, "unknown model hint, using default");
            }
        }
        self.pick(hint)
            .ok_or_else(|| AnalysisError::Unavailable("no analyzer backend configured".into()))
    }

    /// Run one analysis on the hinted (or default) backend, bounded by the gateway timeout.
    pub async fn analyze(&self, text: &str, hint: Option<&str>) -> Result<Analysis, AnalysisError> {
        let backend = self.select(hint)?;
        if !backend.available() {
            return Err(AnalysisError::Unavailable(format!(
                "backend {} reports unavailable",
                backend.name()
            )));
        }

        let started = Instant::now();
        let call = AssertUnwindSafe(backend.analyze(text)).catch_unwind();
        let output = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(res)) => res?,
            Ok(Err(payload)) => {
                let message = format!("backend panicked: {}", panic_message(payload.as_ref()));
                warn!(target: "gateway", model = backend.name(), %message, "analysis aborted");
                return Err(AnalysisError::Model {
                    model: backend.name().to_string(),
                    message,
                });
            }
            Err(_) => return Err(AnalysisError::Timeout(self.timeout)),
        };
        let latency = started.elapsed();
        debug!(
            target: "gateway",
            model = backend.name(),
            content = %anon_id(text),
            latency_ms = latency.as_millis() as u64,
            "analysis done"
        );
        Ok(Analysis {
            output,
            model_used: backend.name().to_string(),
            latency,
        })
    }
}

/// Deterministic backend for tests and local runs.
#[derive(Debug, Clone)]
pub struct MockAnalyzer {
    name: String,
    pub fixed: ModelOutput,
}

impl MockAnalyzer {
    pub fn new(fixed: ModelOutput) -> Self {
        Self {
            name: "mock".to_string(),
            fixed,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new(ModelOutput {
            sentiment: Some(Sentiment::Neutral),
            category: Some("general".to_string()),
            keywords: Some(Vec::new()),
            priority: Some(PriorityLabel::Medium),
            confidence: Some(0.9),
            summary: Some("mock analysis".to_string()),
            suggestions: Vec::new(),
            deep_analysis: None,
        })
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, _text: &str) -> Result<ModelOutput, AnalysisError> {
        Ok(self.fixed.clone())
    }
}

/// `ANALYZER_TEST_MODE=mock` → budgeted mock backend; otherwise no backend at all.
pub fn build_gateway_from_env(timeout: Duration, daily_limit: u32) -> AnalyzerGateway {
    let gateway = AnalyzerGateway::new(timeout);
    let mock = std::env::var(ENV_TEST_MODE)
        .map(|v| v.eq_ignore_ascii_case("mock"))
        .unwrap_or(false);
    if !mock {
        return gateway;
    }
    let backend = super::budget::BudgetedAnalyzer::new(MockAnalyzer::default(), daily_limit);
    gateway.with_backend(Arc::new(backend))
}
