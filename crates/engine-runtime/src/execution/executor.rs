use crate::{
    coordinator::{PipelineCoordinator, PipelineParams, RunOptions},
    error::{PipelineAbort, RuntimeError},
    events::EventSink,
    execution::factory,
};
use engine_config::{
    report::summary::SummaryReport,
    settings::{Config, TargetConfig, validated::RunSettings, validator::SettingsValidator},
};
use engine_core::{
    metrics::Metrics,
    state::{ProgressStore, ProgressSummary, StateBackend},
};
use std::{collections::HashMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of running one or more targets. Targets run in order and the first
/// abort stops the rest.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<SummaryReport>,
    pub aborted: Option<PipelineAbort>,
    /// Shutdown arrived between targets.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn any_failed(&self) -> bool {
        self.reports.iter().any(|r| r.counters.failed > 0)
    }
}

pub struct RunRequest<'a> {
    pub config: &'a Config,
    pub settings: &'a RunSettings,
    pub env: &'a HashMap<String, String>,
    pub target: Option<&'a str>,
    pub options: RunOptions,
    pub batch_size: Option<usize>,
}

pub async fn run(
    request: RunRequest<'_>,
    cancel: CancellationToken,
) -> Result<RunSummary, RuntimeError> {
    let targets = request.config.select_targets(request.target)?;
    let backend = factory::open_backend(request.settings)?;
    let events = factory::create_event_sink(request.settings, request.env);

    let result = run_targets(&request, targets, backend, events.clone(), cancel).await;
    events.flush(request.settings.event_timeout).await;
    result
}

async fn run_targets(
    request: &RunRequest<'_>,
    targets: Vec<&TargetConfig>,
    backend: Arc<dyn StateBackend>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> Result<RunSummary, RuntimeError> {
    let mut summary = RunSummary::default();
    let total = targets.len();

    for (idx, target) in targets.into_iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(
                "Shutdown requested before starting target {}/{}: {}",
                idx + 1,
                total,
                target.name
            );
            summary.interrupted = true;
            break;
        }

        info!("Processing target {}/{}: {}", idx + 1, total, target.name);

        let mut settings = SettingsValidator::for_target(request.settings, target);
        if let Some(size) = request.batch_size {
            settings = settings.with_batch_size(size);
        }

        let metrics = Metrics::new();
        let stream = factory::create_stream(target, &settings)?;
        let params = PipelineParams {
            source: factory::create_source(target, &settings, &stream)?,
            sink: factory::create_sink(target, &settings, request.env, &stream, &metrics)?,
            store: ProgressStore::new(&target.name, backend.clone(), settings.flush_interval)?,
            events: events.clone(),
            metrics,
            settings,
            cancel: cancel.clone(),
        };

        let mut coordinator = PipelineCoordinator::new(params, request.options);
        match coordinator.run().await {
            Ok(report) => summary.reports.push(report),
            Err(abort) => {
                summary.reports.push((*abort.report).clone());
                summary.aborted = Some(abort);
                break;
            }
        }
    }

    Ok(summary)
}

fn store_for(
    backend: Arc<dyn StateBackend>,
    target: &TargetConfig,
    settings: &RunSettings,
) -> Result<ProgressStore, RuntimeError> {
    Ok(ProgressStore::new(
        &target.name,
        backend,
        settings.flush_interval,
    )?)
}

/// Persisted progress of one target.
pub async fn progress(
    config: &Config,
    settings: &RunSettings,
    target: &str,
) -> Result<ProgressSummary, RuntimeError> {
    let target = config.target(target)?;
    let store = store_for(factory::open_backend(settings)?, target, settings)?;
    Ok(store.summary().await?)
}

/// Deletes a target's progress record and completion marker.
pub async fn clear(
    config: &Config,
    settings: &RunSettings,
    target: &str,
) -> Result<(), RuntimeError> {
    let target = config.target(target)?;
    let mut store = store_for(factory::open_backend(settings)?, target, settings)?;
    store.clear().await?;
    Ok(())
}
