// src/analyze/budget.rs
//! Result cache + daily call limit around any analyzer backend.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::gateway::{Analyzer, ModelOutput};
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            count: 0,
        }
    }

    /// Returns true when a new day started.
    fn roll_if_expired(&mut self) -> bool {
        let today = Utc::now().date_naive();
        if self.date == today {
            return false;
        }
        self.date = today;
        self.count = 0;
        true
    }
}

fn cache_key(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cache hits are free; only real backend calls count against the limit.
/// The cache lives for one UTC day, so it never holds more than `daily_limit` entries.
pub struct BudgetedAnalyzer<A: Analyzer> {
    inner: A,
    daily_limit: u32,
    cache: Mutex<HashMap<String, ModelOutput>>,
    counter: Mutex<DailyCounter>,
}

impl<A: Analyzer> BudgetedAnalyzer<A> {
    pub fn new(inner: A, daily_limit: u32) -> Self {
        Self {
            inner,
            daily_limit,
            cache: Mutex::new(HashMap::new()),
            counter: Mutex::new(DailyCounter::today()),
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        let mut g = self.counter.lock();
        self.roll(&mut g);
        g.count
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    fn roll(&self, counter: &mut DailyCounter) {
        if counter.roll_if_expired() {
            self.cache.lock().clear();
        }
    }
}

#[async_trait]
impl<A: Analyzer> Analyzer for BudgetedAnalyzer<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn available(&self) -> bool {
        self.inner.available()
    }

    async fn analyze(&self, text: &str) -> Result<ModelOutput, AnalysisError> {
        let key = cache_key(text);
        {
            let mut g = self.counter.lock();
            self.roll(&mut g);
        }
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }

        {
            let mut g = self.counter.lock();
            self.roll(&mut g);
            if g.count >= self.daily_limit {
                return Err(AnalysisError::Budget {
                    limit: self.daily_limit,
                });
            }
            // reserve the slot before the call so concurrent tasks cannot overshoot
            g.count = g.count.saturating_add(1);
        }

        let out = self.inner.analyze(text).await?;
        self.cache.lock().insert(key, out.clone());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::gateway::MockAnalyzer;

    #[tokio::test]
    async fn cache_hits_do_not_count() {
        let b = BudgetedAnalyzer::new(MockAnalyzer::default(), 2);
        b.analyze("same text").await.unwrap();
        b.analyze("same text").await.unwrap();
        assert_eq!(b.calls_today(), 1);
    }

    #[tokio::test]
    async fn new_day_resets_count_and_cache() {
        let b = BudgetedAnalyzer::new(MockAnalyzer::default(), 5);
        b.analyze("one").await.unwrap();
        b.analyze("two").await.unwrap();
        assert_eq!(b.cached_entries(), 2);

        {
            let mut g = b.counter.lock();
            g.date = g.date.pred_opt().unwrap();
        }
        assert_eq!(b.calls_today(), 0);
        assert_eq!(b.cached_entries(), 0);

        b.analyze("one").await.unwrap();
        assert_eq!((b.calls_today(), b.cached_entries()), (1, 1));
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let b = BudgetedAnalyzer::new(MockAnalyzer::default(), 2);
        b.analyze("one").await.unwrap();
        b.analyze("two").await.unwrap();
        let err = b.analyze("three").await.unwrap_err();
        assert_eq!(err, AnalysisError::Budget { limit: 2 });
        // cached content still served
        assert!(b.analyze("one").await.is_ok());
    }
}
