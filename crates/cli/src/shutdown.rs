use engine_runtime::{error::PipelineError, execution::executor::RunSummary};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Listens for SIGINT and SIGTERM and cancels the run at the next batch
/// boundary.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();
        let shutdown_flag = self.shutdown_requested.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to install SIGINT handler: {e}");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sig) => {
                        sig.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {e}");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C), stopping after the current batch");
                }
                _ = terminate => {
                    info!("Received SIGTERM, stopping after the current batch");
                }
            }

            shutdown_flag.store(true, Ordering::SeqCst);
            cancel_token.cancel();
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    PartialFailure = 2,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn for_summary(summary: &RunSummary) -> Self {
        match &summary.aborted {
            Some(abort) if matches!(abort.cause, PipelineError::Cancelled) => {
                ExitCode::ShutdownRequested
            }
            Some(_) => ExitCode::GeneralError,
            None if summary.interrupted => ExitCode::ShutdownRequested,
            None if summary.any_failed() => ExitCode::PartialFailure,
            None => ExitCode::Success,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engine_config::report::summary::{RunOutcome, SummaryReport};
    use engine_core::{error::StateError, metrics::MetricsSnapshot};
    use engine_runtime::error::PipelineAbort;
    use model::progress::counters::Counters;

    fn report(outcome: RunOutcome, failed: u64) -> SummaryReport {
        let counters = Counters {
            failed,
            ..Counters::default()
        };
        SummaryReport::new(
            "docs",
            outcome,
            counters,
            MetricsSnapshot::default(),
            Vec::new(),
            Utc::now(),
        )
    }

    fn aborted(cause: PipelineError) -> RunSummary {
        RunSummary {
            reports: Vec::new(),
            aborted: Some(PipelineAbort {
                cause,
                report: Box::new(report(RunOutcome::Aborted, 0)),
            }),
            interrupted: false,
        }
    }

    #[test]
    fn clean_run_exits_zero() {
        let summary = RunSummary {
            reports: vec![report(RunOutcome::Completed, 0)],
            ..RunSummary::default()
        };
        assert_eq!(ExitCode::for_summary(&summary), ExitCode::Success);
    }

    #[test]
    fn failed_units_exit_two() {
        let summary = RunSummary {
            reports: vec![
                report(RunOutcome::Completed, 0),
                report(RunOutcome::PartialFailure, 100),
            ],
            ..RunSummary::default()
        };
        assert_eq!(ExitCode::for_summary(&summary), ExitCode::PartialFailure);
    }

    #[test]
    fn aborts_map_to_error_or_shutdown() {
        assert_eq!(
            ExitCode::for_summary(&aborted(PipelineError::Cancelled)),
            ExitCode::ShutdownRequested
        );
        assert_eq!(
            ExitCode::for_summary(&aborted(PipelineError::State(StateError::Corrupt {
                target: "docs".into(),
                location: "docs.progress.json".into(),
                reason: "expected value at line 1".into(),
            }))),
            ExitCode::GeneralError
        );
        assert_eq!(ExitCode::ShutdownRequested.as_u8(), 130);
    }

    #[test]
    fn interrupt_between_targets_is_a_shutdown() {
        let summary = RunSummary {
            interrupted: true,
            ..RunSummary::default()
        };
        assert_eq!(ExitCode::for_summary(&summary), ExitCode::ShutdownRequested);
    }
}
