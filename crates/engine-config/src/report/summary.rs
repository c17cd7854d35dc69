use chrono::{DateTime, Utc};
use engine_core::metrics::MetricsSnapshot;
use model::{progress::counters::Counters, records::unit::UnitKey};
use serde::Serialize;

/// Failed keys listed in a report; the rest are only counted.
pub const MAX_REPORTED_FAILED_KEYS: usize = 100;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every unit succeeded and the record was cleared.
    Completed,
    /// The run finished, but some units exhausted their retries.
    PartialFailure,
    /// A completion marker was found on `--resume`; nothing ran.
    AlreadyComplete,
    /// The run stopped at `--limit`; the rest stays pending for `--resume`.
    Limited,
    /// A terminal failure or cancellation stopped the run early.
    Aborted,
}

#[derive(Serialize, Debug, Clone)]
pub struct SummaryReport {
    pub target: String,
    pub outcome: RunOutcome,
    pub counters: Counters,
    pub retries: u64,
    pub bytes_transferred: u64,
    pub stalls: u64,
    pub batches: u64,
    pub failed_keys: Vec<UnitKey>,
    pub failed_keys_truncated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl SummaryReport {
    pub fn new(
        target: impl Into<String>,
        outcome: RunOutcome,
        counters: Counters,
        metrics: MetricsSnapshot,
        mut failed_keys: Vec<UnitKey>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let target = target.into();
        let finished_at = Utc::now();
        let elapsed_secs = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let failed_keys_truncated = failed_keys.len() > MAX_REPORTED_FAILED_KEYS;
        failed_keys.truncate(MAX_REPORTED_FAILED_KEYS);

        let unfinished = matches!(outcome, RunOutcome::Aborted | RunOutcome::Limited);
        let hint = (counters.failed > 0 || unfinished).then(|| {
            format!("Re-run with `ferry run --target {target} --resume` to retry pending and failed units")
        });

        Self {
            target,
            outcome,
            counters,
            retries: metrics.retry_count,
            bytes_transferred: metrics.bytes_transferred,
            stalls: metrics.stall_count,
            batches: metrics.batches_processed,
            failed_keys,
            failed_keys_truncated,
            started_at,
            finished_at,
            elapsed_secs,
            error: None,
            hint,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            RunOutcome::Completed | RunOutcome::AlreadyComplete | RunOutcome::Limited
        ) && self.counters.failed == 0
    }
}
