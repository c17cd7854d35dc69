use crate::{
    error::{PipelineAbort, PipelineError},
    events::EventSink,
    reporter::ProgressReporter,
};
use chrono::{DateTime, Utc};
use connectors::{sink::BatchSink, source::BatchSource};
use engine_config::{
    report::summary::{RunOutcome, SummaryReport},
    settings::validated::RunSettings,
};
use engine_core::{metrics::Metrics, state::ProgressStore};
use engine_processing::executor::{ExecutionOutcome, RetryingExecutor};
use futures::{StreamExt, TryStreamExt};
use model::{
    events::RunEvent,
    progress::counters::Counters,
    records::{batch::Batch, unit::WorkUnit},
};
use std::{mem, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Streaming,
    BatchExecuting,
    Flushing,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub resume: bool,
    pub limit: Option<usize>,
}

/// Everything a coordinator needs for one target.
pub struct PipelineParams {
    pub source: Arc<dyn BatchSource>,
    pub sink: Arc<dyn BatchSink>,
    pub store: ProgressStore,
    pub events: Arc<dyn EventSink>,
    pub metrics: Metrics,
    pub settings: RunSettings,
    pub cancel: CancellationToken,
}

/// Drives one target from source to sink: batches units, runs each batch
/// through the retrying executor and records the outcome before pulling the
/// next batch.
pub struct PipelineCoordinator {
    run_id: String,
    source: Arc<dyn BatchSource>,
    sink: Arc<dyn BatchSink>,
    store: ProgressStore,
    executor: RetryingExecutor,
    events: Arc<dyn EventSink>,
    reporter: ProgressReporter,
    metrics: Metrics,
    settings: RunSettings,
    cancel: CancellationToken,
    options: RunOptions,
    state: PipelineState,
    counters: Counters,
    started_at: DateTime<Utc>,
    batches: u64,
    store_ready: bool,
}

impl PipelineCoordinator {
    pub fn new(params: PipelineParams, options: RunOptions) -> Self {
        let executor = RetryingExecutor::new(
            params.settings.retry.clone(),
            params.settings.call_timeout,
            params.metrics.clone(),
            params.cancel.clone(),
        );
        let reporter =
            ProgressReporter::new(params.store.target(), params.settings.progress_interval);

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: params.source,
            sink: params.sink,
            store: params.store,
            executor,
            events: params.events,
            reporter,
            metrics: params.metrics,
            settings: params.settings,
            cancel: params.cancel,
            options,
            state: PipelineState::Init,
            counters: Counters::default(),
            started_at: Utc::now(),
            batches: 0,
            store_ready: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn target(&self) -> &str {
        self.store.target()
    }

    /// Runs the pipeline to completion. A coordinator runs once.
    pub async fn run(&mut self) -> Result<SummaryReport, PipelineAbort> {
        info!(
            run_id = %self.run_id,
            target_name = %self.target(),
            source = self.source.name(),
            sink = self.sink.name(),
            resume = self.options.resume,
            "Starting pipeline"
        );

        match self.drive().await {
            Ok(outcome) => Ok(self.finish(outcome)),
            Err(cause) => Err(self.abort(cause).await),
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome, PipelineError> {
        if let Some(outcome) = self.init().await? {
            return Ok(outcome);
        }

        self.events.emit(RunEvent::RunStarted {
            run_id: self.run_id.clone(),
            target: self.target().to_string(),
            resume: self.options.resume,
            at: Utc::now(),
        });

        self.transition(PipelineState::Streaming);
        let filter = Arc::new(self.store.completed_keys());
        // One unit past the limit tells a cut-short run from an exhausted source.
        let fetch_limit = self.options.limit.map(|n| n.saturating_add(1));
        let mut stream = self.source.stream(filter, fetch_limit).await?;

        let batch_size = self.settings.batch_size;
        let mut pending: Vec<WorkUnit> = Vec::with_capacity(batch_size);
        let mut pulled = 0usize;
        let mut limited = false;

        loop {
            if pending.is_empty() && self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            if self.options.limit.is_some_and(|limit| pulled >= limit) {
                limited = stream.next().await.is_some();
                break;
            }

            let Some(unit) = stream.try_next().await? else {
                break;
            };
            pulled += 1;
            pending.push(unit);

            if pending.len() >= batch_size {
                let units = mem::replace(&mut pending, Vec::with_capacity(batch_size));
                self.execute_batch(units).await?;
                self.pause_between_batches().await;
            }
        }

        self.transition(PipelineState::Flushing);
        if !pending.is_empty() {
            self.execute_batch(pending).await?;
        }
        self.store.flush().await?;

        self.transition(PipelineState::Done);

        if self.counters.failed > 0 {
            warn!(
                target_name = %self.target(),
                failed = self.counters.failed,
                location = %self.store.location(),
                "Run finished with failed units; progress kept for --resume"
            );
            Ok(RunOutcome::PartialFailure)
        } else if limited {
            info!(target_name = %self.target(), pulled, "Stopped at unit limit");
            Ok(RunOutcome::Limited)
        } else {
            self.store.finish_clean(self.counters.succeeded).await?;
            Ok(RunOutcome::Completed)
        }
    }

    /// Returns `Some` when there is nothing to run.
    async fn init(&mut self) -> Result<Option<RunOutcome>, PipelineError> {
        self.transition(PipelineState::Init);

        if self.settings.batch_size == 0 {
            return Err(PipelineError::InvalidSettings(
                "batch size must be > 0".to_string(),
            ));
        }
        if self.settings.retry.max_attempts == 0 {
            return Err(PipelineError::InvalidSettings(
                "max retries must be > 0".to_string(),
            ));
        }

        if self.options.resume {
            let empty = self.store.load().await?.is_empty();
            if empty && let Some(marker) = self.store.completion_marker().await? {
                info!(
                    target_name = %self.target(),
                    finished_at = %marker.finished_at,
                    succeeded = marker.succeeded,
                    "Target already completed, nothing to resume"
                );
                self.transition(PipelineState::Done);
                return Ok(Some(RunOutcome::AlreadyComplete));
            }
            self.counters.skipped = self.store.record().completed_count() as u64;
        } else {
            self.store.start_fresh().await?;
        }
        self.store_ready = true;

        let completed = self.store.completed_keys();
        match self.source.remaining(&completed).await {
            Ok(Some(n)) => {
                let n = self.options.limit.map_or(n, |limit| n.min(limit as u64));
                self.counters.observe_total(n);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not size source, progress will have no ETA"),
        }

        info!(
            target_name = %self.target(),
            total = self.counters.total,
            skipped = self.counters.skipped,
            batch_size = self.settings.batch_size,
            "Pipeline initialized"
        );
        Ok(None)
    }

    async fn execute_batch(&mut self, units: Vec<WorkUnit>) -> Result<(), PipelineError> {
        self.transition(PipelineState::BatchExecuting);
        self.batches += 1;

        let batch = Batch::new(self.batches, units);
        let keys = batch.keys();
        let n = keys.len() as u64;

        match self.executor.submit(&batch, self.sink.as_ref()).await? {
            ExecutionOutcome::Succeeded { attempts } => {
                self.store.record_completed(&keys).await?;
                self.counters.record_success(n);
                debug!(batch = batch.seq, units = n, attempts, "Batch completed");
            }
            ExecutionOutcome::Failed { attempts, error } => {
                error!(
                    batch = batch.seq,
                    units = n,
                    attempts,
                    error = %error,
                    "Batch failed after all retries"
                );
                self.store.record_failed(&keys).await?;
                self.counters.record_failure(n);
                self.events.emit(RunEvent::BatchFailed {
                    run_id: self.run_id.clone(),
                    target: self.target().to_string(),
                    batch_seq: batch.seq,
                    units: keys.len(),
                    attempts,
                    error: error.to_string(),
                    at: Utc::now(),
                });
            }
            ExecutionOutcome::Abandoned { attempts, error } => {
                warn!(
                    batch = batch.seq,
                    attempts,
                    error = %error,
                    "Shutdown during retry backoff, batch left pending"
                );
                return Err(PipelineError::Cancelled);
            }
        }

        self.metrics.increment_batches(1);
        if self.reporter.is_due(self.batches) {
            self.reporter.report(&self.counters);
            self.events.emit(RunEvent::Progress {
                run_id: self.run_id.clone(),
                target: self.target().to_string(),
                counters: self.counters,
                at: Utc::now(),
            });
        }

        self.transition(PipelineState::Streaming);
        Ok(())
    }

    async fn pause_between_batches(&self) {
        let pause = self.settings.sleep_between_batches;
        if pause.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }

    fn finish(&mut self, outcome: RunOutcome) -> SummaryReport {
        self.reporter.report(&self.counters);
        self.events.emit(RunEvent::RunCompleted {
            run_id: self.run_id.clone(),
            target: self.target().to_string(),
            counters: self.counters,
            at: Utc::now(),
        });

        let report = self.report(outcome);
        info!(
            target_name = %self.target(),
            outcome = ?outcome,
            succeeded = self.counters.succeeded,
            failed = self.counters.failed,
            skipped = self.counters.skipped,
            elapsed_secs = report.elapsed_secs,
            "Pipeline finished"
        );
        report
    }

    async fn abort(&mut self, cause: PipelineError) -> PipelineAbort {
        let during = self.state;
        self.transition(PipelineState::Aborted);

        // Never flush before the record was loaded: that would overwrite it.
        if self.store_ready
            && let Err(e) = self.store.flush().await
        {
            error!(error = %e, "Failed to flush progress while aborting");
        }

        match &cause {
            PipelineError::Cancelled => warn!(
                target_name = %self.target(),
                processed = self.counters.processed,
                "Pipeline stopped on shutdown request, progress saved"
            ),
            other => error!(
                target_name = %self.target(),
                state = ?during,
                error = %other,
                "Pipeline aborted"
            ),
        }

        self.events.emit(RunEvent::RunAborted {
            run_id: self.run_id.clone(),
            target: self.target().to_string(),
            reason: cause.to_string(),
            counters: self.counters,
            at: Utc::now(),
        });

        let report = self.report(RunOutcome::Aborted).with_error(cause.to_string());
        PipelineAbort {
            cause,
            report: Box::new(report),
        }
    }

    fn report(&self, outcome: RunOutcome) -> SummaryReport {
        SummaryReport::new(
            self.target(),
            outcome,
            self.counters,
            self.metrics.snapshot(),
            self.store.record().failed_keys(),
            self.started_at,
        )
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Pipeline state");
            self.state = next;
        }
    }
}
