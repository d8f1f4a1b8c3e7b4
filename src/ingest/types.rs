// src/ingest/types.rs
use serde::{Deserialize, Serialize};

/// Why a raw item did not become a record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("not a key/value object")]
    NotAnObject,
    #[error("content too short (length {len})")]
    ContentTooShort { len: usize },
    #[error("quality below threshold ({score:.3})")]
    QualityBelowThreshold { score: f64 },
    #[error("store insert failed: {0}")]
    StoreInsertFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub reason: RejectReason,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item {}: {}", self.index, self.reason)
    }
}

/// Partial-success summary of one ingest batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub record_ids: Vec<String>,
    /// At most `rejection_samples` example reasons.
    pub rejection_samples: Vec<String>,
}

impl BatchOutcome {
    pub fn success(&self) -> bool {
        self.accepted > 0
    }
}

/// Snapshot of how far records have progressed through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total: usize,
    pub raw_processed: usize,
    pub awaiting_analysis: usize,
    pub analyzed: usize,
    /// analyzed / total, 0 when the store is empty
    pub completion_rate: f64,
}
