use model::progress::counters::Counters;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

/// One progress line: processed/total, percentage, failures, rate and ETA.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressLine {
    pub processed: u64,
    pub total: u64,
    pub percent: Option<f64>,
    pub failed: u64,
    pub skipped: u64,
    /// Units per second since the run started.
    pub rate: f64,
    pub eta_secs: Option<u64>,
}

/// Emits a progress line every `interval` batches.
pub struct ProgressReporter {
    target: String,
    interval: usize,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(target: impl Into<String>, interval: usize) -> Self {
        Self {
            target: target.into(),
            interval: interval.max(1),
            started: Instant::now(),
        }
    }

    pub fn is_due(&self, batches_done: u64) -> bool {
        batches_done > 0 && batches_done % self.interval as u64 == 0
    }

    pub fn line(&self, counters: &Counters) -> ProgressLine {
        Self::compute(counters, self.started.elapsed())
    }

    pub fn compute(counters: &Counters, elapsed: Duration) -> ProgressLine {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            counters.processed as f64 / secs
        } else {
            0.0
        };
        let remaining = counters.remaining();
        let eta_secs = (rate > 0.0 && counters.total > 0)
            .then(|| (remaining as f64 / rate).ceil() as u64);

        ProgressLine {
            processed: counters.processed,
            total: counters.total,
            percent: counters.percent(),
            failed: counters.failed,
            skipped: counters.skipped,
            rate,
            eta_secs,
        }
    }

    pub fn report(&self, counters: &Counters) -> ProgressLine {
        let line = self.line(counters);
        info!(
            target_name = %self.target,
            processed = line.processed,
            total = line.total,
            percent = format!("{:.1}", line.percent.unwrap_or(0.0)),
            failed = line.failed,
            rate = format!("{:.1}/s", line.rate),
            eta = %format_eta(line.eta_secs),
            "Progress"
        );
        line
    }
}

pub fn format_eta(eta_secs: Option<u64>) -> String {
    match eta_secs {
        None => "unknown".to_string(),
        Some(s) if s >= 3600 => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
        Some(s) if s >= 60 => format!("{}m{:02}s", s / 60, s % 60),
        Some(s) => format!("{s}s"),
    }
}
