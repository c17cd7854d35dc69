use serde::Serialize;

/// Aggregate counters for one run. Every field only ever grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Units already completed in the loaded record when the run started.
    /// The source filters them out, so they are never part of `processed`.
    pub skipped: u64,
}

impl Counters {
    /// Raises `total` to at least `n`.
    pub fn observe_total(&mut self, n: u64) {
        self.total = self.total.max(n);
    }

    pub fn record_success(&mut self, n: u64) {
        self.processed += n;
        self.succeeded += n;
        self.total = self.total.max(self.processed);
    }

    pub fn record_failure(&mut self, n: u64) {
        self.processed += n;
        self.failed += n;
        self.total = self.total.max(self.processed);
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed)
    }

    pub fn percent(&self) -> Option<f64> {
        (self.total > 0).then(|| 100.0 * self.processed as f64 / self.total as f64)
    }
}
