use crate::{error::TerminalBatchError, retry::classify_sink_error};
use connectors::{error::SinkError, sink::BatchSink};
use engine_core::{
    metrics::Metrics,
    retry::{RetryError, RetryPolicy},
};
use model::records::batch::Batch;
use std::{future::Future, time::Duration};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What became of a batch that did not fail terminally.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Succeeded { attempts: usize },
    /// Every attempt failed transiently.
    Failed { attempts: usize, error: SinkError },
    /// Cancellation arrived while waiting to retry; the units stay pending.
    Abandoned { attempts: usize, error: SinkError },
}

impl ExecutionOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            ExecutionOutcome::Succeeded { attempts }
            | ExecutionOutcome::Failed { attempts, .. }
            | ExecutionOutcome::Abandoned { attempts, .. } => *attempts,
        }
    }
}

/// Runs a batch operation under a [`RetryPolicy`], bounding every attempt by
/// `call_timeout`.
#[derive(Clone)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
    call_timeout: Duration,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl RetryingExecutor {
    pub fn new(
        policy: RetryPolicy,
        call_timeout: Duration,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policy,
            call_timeout,
            metrics,
            cancel,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn submit(
        &self,
        batch: &Batch,
        sink: &dyn BatchSink,
    ) -> Result<ExecutionOutcome, TerminalBatchError> {
        self.execute(batch, |_| sink.submit(batch)).await
    }

    /// `operation` is called once per attempt with the 1-based attempt number.
    pub async fn execute<F, Fut>(
        &self,
        batch: &Batch,
        mut operation: F,
    ) -> Result<ExecutionOutcome, TerminalBatchError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<(), SinkError>>,
    {
        let call_timeout = self.call_timeout;
        let result = self
            .policy
            .run_until_cancelled(
                &self.cancel,
                |attempt| {
                    let call = operation(attempt);
                    async move {
                        match timeout(call_timeout, call).await {
                            Ok(result) => result,
                            Err(_) => Err(SinkError::Timeout(format!(
                                "attempt exceeded {}s",
                                call_timeout.as_secs_f64()
                            ))),
                        }
                    }
                },
                classify_sink_error,
                |attempt, error, delay| {
                    self.metrics.increment_retries(1);
                    warn!(
                        batch = batch.seq,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Batch attempt failed, retrying"
                    );
                },
            )
            .await;

        match result {
            Ok(done) => Ok(ExecutionOutcome::Succeeded {
                attempts: done.attempts,
            }),
            Err(RetryError::AttemptsExceeded { error, attempts }) => {
                Ok(ExecutionOutcome::Failed { attempts, error })
            }
            Err(RetryError::Cancelled { error, attempts }) => {
                Ok(ExecutionOutcome::Abandoned { attempts, error })
            }
            Err(RetryError::Fatal { error, attempts }) => Err(TerminalBatchError {
                batch_seq: batch.seq,
                keys: batch.keys(),
                attempts,
                source: error,
            }),
        }
    }
}
