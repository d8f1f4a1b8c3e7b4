// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod record;
pub mod store;

// Raw intake (normalisation, quality gate)
pub mod ingest;

// Heuristic filter + model gateway
pub mod analyze;

// Background analysis queue
pub mod engine;

// Ranking and planning
pub mod planner;
pub mod scoring;

pub mod pipeline;

mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::error::{AnalysisError, ConfigError, PipelineError, StoreError, TaskError};
pub use crate::pipeline::{PipelineManager, PipelineResult, PipelineStatus};
pub use crate::record::FeedbackRecord;
pub use crate::store::{InMemoryStore, RecordStore};
