use connectors::error::{SinkError, SourceError, TransferError};
use engine_config::{error::ConfigError, report::summary::SummaryReport};
use engine_core::error::StateError;
use engine_processing::error::TerminalBatchError;
use thiserror::Error;

/// Reasons a pipeline run stops before reaching `Done`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline settings: {0}")]
    InvalidSettings(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Terminal(#[from] TerminalBatchError),

    #[error("Progress state error: {0}")]
    State(#[from] StateError),

    #[error("Shutdown requested")]
    Cancelled,
}

/// A run that aborted, together with the report of what it got done.
#[derive(Debug, Error)]
#[error("Target '{}' aborted: {cause}", .report.target)]
pub struct PipelineAbort {
    pub cause: PipelineError,
    pub report: Box<SummaryReport>,
}

/// Errors raised while turning configuration into runnable targets.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Progress state error: {0}")]
    State(#[from] StateError),

    #[error("Failed to set up sink: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to set up byte stream: {0}")]
    Transfer(#[from] TransferError),

    #[error("Missing environment variable {0}")]
    MissingEnv(String),

    #[error(transparent)]
    Aborted(#[from] PipelineAbort),
}
