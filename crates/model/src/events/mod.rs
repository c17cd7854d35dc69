use crate::progress::counters::Counters;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle events a pipeline run reports to its observability sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        target: String,
        resume: bool,
        at: DateTime<Utc>,
    },
    Progress {
        run_id: String,
        target: String,
        counters: Counters,
        at: DateTime<Utc>,
    },
    BatchFailed {
        run_id: String,
        target: String,
        batch_seq: u64,
        units: usize,
        attempts: usize,
        error: String,
        at: DateTime<Utc>,
    },
    RunCompleted {
        run_id: String,
        target: String,
        counters: Counters,
        at: DateTime<Utc>,
    },
    RunAborted {
        run_id: String,
        target: String,
        reason: String,
        counters: Counters,
        at: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Returns a stable identifier for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run.started",
            RunEvent::Progress { .. } => "run.progress",
            RunEvent::BatchFailed { .. } => "batch.failed",
            RunEvent::RunCompleted { .. } => "run.completed",
            RunEvent::RunAborted { .. } => "run.aborted",
        }
    }

    /// Severity used when the event is logged or shipped.
    pub fn level(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } | RunEvent::Progress { .. } => "info",
            RunEvent::RunCompleted { counters, .. } if counters.failed == 0 => "success",
            RunEvent::RunCompleted { .. } | RunEvent::BatchFailed { .. } => "warning",
            RunEvent::RunAborted { .. } => "error",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            RunEvent::RunStarted { target, .. }
            | RunEvent::Progress { target, .. }
            | RunEvent::BatchFailed { target, .. }
            | RunEvent::RunCompleted { target, .. }
            | RunEvent::RunAborted { target, .. } => target,
        }
    }
}
