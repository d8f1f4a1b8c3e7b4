//! Error types for the feedback pipeline.
//!
//! Per-record and per-task problems are absorbed where they happen and turned into
//! structured outcomes; only the variants reachable from `PipelineManager::initialize`
//! and `shutdown` ever reach a caller.

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a `RecordStore` implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The record does not exist (e.g. `update` of an unknown id).
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backend rejected or could not serve the request.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The backend could not be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why a model-based analysis produced no result.
///
/// The job engine pattern-matches on this instead of catching generic failures:
/// every variant leads to the heuristic fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// No backend is configured, or the selected one reports itself unavailable.
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the per-call timeout.
    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with an error or an unusable payload.
    #[error("model {model} failed: {message}")]
    Model { model: String, message: String },

    /// The daily call budget is exhausted.
    #[error("analysis budget exhausted ({limit} calls per day)")]
    Budget { limit: u32 },
}

/// The heuristic filter could not produce a decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("nothing to evaluate: text is empty")]
    EmptyText,

    #[error("dimension `{0}` produced a non-finite score")]
    NonFinite(&'static str),
}

/// Unexpected failure while executing one processing task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("feedback record does not exist: {0}")]
    RecordNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config path {0} does not exist")]
    Missing(String),

    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Process-level failures surfaced by the pipeline manager.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("record store is not usable: {0}")]
    Store(#[from] StoreError),

    #[error("job engine: {0}")]
    Engine(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_wraps_store_error_transparently() {
        let e: TaskError = StoreError::Backend("disk full".into()).into();
        assert_eq!(e.to_string(), "store backend error: disk full");
    }

    #[test]
    fn panic_payloads_become_text() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("index out of range"));
        assert_eq!(panic_message(owned.as_ref()), "index out of range");
        let fixed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(fixed.as_ref()), "boom");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn timeout_message_mentions_duration() {
        let e = AnalysisError::Timeout(Duration::from_millis(1500));
        assert!(e.to_string().contains("1.5s"));
    }
}
