// src/engine/stats.rs
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    processed: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    pub fn record(&self, ok: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, pending: usize) -> EngineStats {
        EngineStats {
            total_processed: self.processed.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct EngineStats {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    /// Tasks still waiting in the queue.
    pub pending: usize,
}

impl EngineStats {
    /// successful / processed, 0 before anything ran
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_processed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_derived() {
        let c = Counters::default();
        assert_eq!(c.snapshot(0).success_rate(), 0.0);
        c.record(true);
        c.record(true);
        c.record(false);
        c.record(true);
        let s = c.snapshot(2);
        assert_eq!((s.total_processed, s.successful, s.failed, s.pending), (4, 3, 1, 2));
        assert!((s.success_rate() - 0.75).abs() < 1e-12);
    }
}
