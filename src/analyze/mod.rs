// src/analyze/mod.rs
//! Analysis stages: the cheap heuristic filter and the model gateway it falls back from.

pub mod budget;
pub mod filter;
pub mod gateway;

pub use budget::BudgetedAnalyzer;
pub use filter::{
    DimensionScores, EscalationReason, FilterDecision, FilterEngine, RandomSource, StdRandom,
};
pub use gateway::{
    build_gateway_from_env, Analysis, Analyzer, AnalyzerGateway, DynAnalyzer, MockAnalyzer,
    ModelInfo, ModelOutput,
};
