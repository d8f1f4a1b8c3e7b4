// src/telemetry.rs
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// Short anonymised id for log lines; raw feedback text is never logged.
pub(crate) fn anon_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// One-time metrics registration.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_accepted_total",
            "Raw items turned into feedback records."
        );
        describe_counter!(
            "ingest_rejected_total",
            "Raw items rejected by the content or quality gate."
        );
        describe_counter!(
            "engine_tasks_completed_total",
            "Processing tasks that finished successfully."
        );
        describe_counter!(
            "engine_tasks_failed_total",
            "Processing tasks that failed on record fetch/persist."
        );
        describe_counter!(
            "engine_analysis_method_total",
            "Analysis results by method (model, heuristic_fallback, ...)."
        );
        describe_gauge!("engine_queue_depth", "Tasks waiting in the priority queue.");
    });
}
