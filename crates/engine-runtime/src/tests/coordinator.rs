#[cfg(test)]
mod tests {
    use crate::{
        coordinator::{PipelineCoordinator, PipelineParams, PipelineState, RunOptions},
        error::PipelineError,
        events::tests::RecordingEventSink,
    };
    use async_trait::async_trait;
    use connectors::{
        error::{SinkError, SourceError},
        sink::BatchSink,
        source::{BatchSource, KeyFilter, StaticSource, UnitStream},
    };
    use engine_config::{report::summary::RunOutcome, settings::validated::RunSettings};
    use engine_core::{
        error::StateError,
        metrics::Metrics,
        retry::RetryPolicy,
        state::{ProgressStore, StateBackend, json_store::JsonFileBackend},
    };
    use model::records::{
        batch::Batch,
        unit::{UnitKey, WorkUnit},
    };
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const TARGET: &str = "docs";

    type Script = dyn Fn(&Batch, usize) -> Result<(), SinkError> + Send + Sync;

    /// Sink whose behavior per batch is decided by a script receiving the
    /// batch and the 1-based attempt number for that batch.
    struct ScriptedSink {
        script: Box<Script>,
        attempts: Mutex<HashMap<UnitKey, usize>>,
        delivered: Mutex<Vec<Vec<UnitKey>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSink {
        fn new(script: impl Fn(&Batch, usize) -> Result<(), SinkError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                attempts: Mutex::new(HashMap::new()),
                delivered: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn healthy() -> Arc<Self> {
            Self::new(|_, _| Ok(()))
        }

        fn delivered_keys(&self) -> Vec<UnitKey> {
            self.delivered.lock().unwrap().iter().flatten().cloned().collect()
        }

        fn delivered_batches(&self) -> usize {
            self.delivered.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BatchSink for ScriptedSink {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, batch: &Batch) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let entry = attempts.entry(batch.units[0].key.clone()).or_default();
                *entry += 1;
                *entry
            };

            (self.script)(batch, attempt)?;
            self.delivered.lock().unwrap().push(batch.keys());
            Ok(())
        }
    }

    /// Never returns from the given batch, standing in for a process crash.
    struct HangingSink {
        hang_on: u64,
        inner: Arc<ScriptedSink>,
    }

    #[async_trait]
    impl BatchSink for HangingSink {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn submit(&self, batch: &Batch) -> Result<(), SinkError> {
            if batch.seq == self.hang_on {
                std::future::pending::<()>().await;
            }
            self.inner.submit(batch).await
        }
    }

    struct UnavailableSource;

    #[async_trait]
    impl BatchSource for UnavailableSource {
        fn name(&self) -> &str {
            "unavailable"
        }

        async fn stream(
            &self,
            _filter: KeyFilter,
            _limit: Option<usize>,
        ) -> Result<UnitStream, SourceError> {
            Err(SourceError::Unavailable("connection refused".into()))
        }
    }

    fn units(n: usize) -> Vec<WorkUnit> {
        (0..n)
            .map(|i| WorkUnit::text(format!("row-{i:04}"), format!("text {i}")))
            .collect()
    }

    fn keys(units: &[WorkUnit]) -> Vec<UnitKey> {
        units.iter().map(|u| u.key.clone()).collect()
    }

    fn unavailable(status: u16) -> SinkError {
        SinkError::Status {
            status,
            body: "unavailable".into(),
        }
    }

    struct Harness {
        _dir: TempDir,
        backend: Arc<dyn StateBackend>,
        events: RecordingEventSink,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let backend: Arc<dyn StateBackend> = Arc::new(JsonFileBackend::new(dir.path()));
            Self {
                _dir: dir,
                backend,
                events: RecordingEventSink::default(),
            }
        }

        fn settings(batch_size: usize) -> RunSettings {
            RunSettings {
                batch_size,
                sleep_between_batches: Duration::ZERO,
                retry: RetryPolicy::immediate(3),
                ..RunSettings::default()
            }
        }

        fn coordinator(
            &self,
            source: Arc<dyn BatchSource>,
            sink: Arc<dyn BatchSink>,
            batch_size: usize,
            options: RunOptions,
            cancel: CancellationToken,
        ) -> PipelineCoordinator {
            let params = PipelineParams {
                source,
                sink,
                store: ProgressStore::new(TARGET, self.backend.clone(), 1).unwrap(),
                events: Arc::new(self.events.clone()),
                metrics: Metrics::new(),
                settings: Self::settings(batch_size),
                cancel,
            };
            PipelineCoordinator::new(params, options)
        }

        fn static_run(
            &self,
            units: &[WorkUnit],
            sink: Arc<dyn BatchSink>,
            batch_size: usize,
            options: RunOptions,
        ) -> PipelineCoordinator {
            self.coordinator(
                Arc::new(StaticSource::new("static", units.to_vec())),
                sink,
                batch_size,
                options,
                CancellationToken::new(),
            )
        }

        async fn persisted(&self) -> Option<model::progress::record::ProgressRecord> {
            self.backend.read_record(TARGET).await.unwrap()
        }
    }

    fn resume() -> RunOptions {
        RunOptions {
            resume: true,
            limit: None,
        }
    }

    #[tokio::test]
    async fn transient_failures_twice_per_batch_still_complete() {
        let h = Harness::new();
        let data = units(250);
        let sink = ScriptedSink::new(|_, attempt| {
            if attempt <= 2 {
                Err(unavailable(503))
            } else {
                Ok(())
            }
        });

        let mut coordinator = h.static_run(&data, sink.clone(), 100, RunOptions::default());
        let report = coordinator.run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.counters.succeeded, 250);
        assert_eq!(report.counters.failed, 0);
        assert_eq!(report.retries, 6);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 9);
        assert_eq!(sink.delivered_keys(), keys(&data));
        assert_eq!(coordinator.state(), PipelineState::Done);

        assert!(h.persisted().await.is_none());
        let marker = h.backend.read_marker(TARGET).await.unwrap().unwrap();
        assert_eq!(marker.succeeded, 250);
    }

    #[tokio::test]
    async fn exhausted_batch_is_recorded_failed_and_run_continues() {
        let h = Harness::new();
        let data = units(250);
        let second_batch = data[100].key.clone();
        let sink = ScriptedSink::new(move |batch, _| {
            if batch.units[0].key == second_batch {
                Err(unavailable(502))
            } else {
                Ok(())
            }
        });

        let report = h
            .static_run(&data, sink.clone(), 100, RunOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::PartialFailure);
        assert_eq!(report.counters.succeeded, 150);
        assert_eq!(report.counters.failed, 100);
        assert_eq!(report.failed_keys, keys(&data[100..200]));
        assert!(report.hint.as_deref().unwrap().contains("--resume"));
        assert!(!report.is_success());

        let record = h.persisted().await.unwrap();
        assert_eq!(record.failed_keys(), keys(&data[100..200]));
        assert_eq!(record.completed_count(), 150);
        assert!(h.events.kinds().contains(&"batch.failed"));

        // A resumed run only retries the failed units.
        let retry_sink = ScriptedSink::healthy();
        let report = h
            .static_run(&data, retry_sink.clone(), 100, resume())
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.counters.skipped, 150);
        assert_eq!(retry_sink.delivered_keys(), keys(&data[100..200]));
        assert!(h.persisted().await.is_none());
    }

    #[tokio::test]
    async fn terminal_failure_stops_before_next_batch() {
        let h = Harness::new();
        let data = units(300);
        let second_batch = data[100].key.clone();
        let sink = ScriptedSink::new(move |batch, _| {
            if batch.units[0].key == second_batch {
                Err(SinkError::Auth("403 forbidden".into()))
            } else {
                Ok(())
            }
        });

        let mut coordinator = h.static_run(&data, sink.clone(), 100, RunOptions::default());
        let abort = coordinator.run().await.unwrap_err();

        assert!(matches!(abort.cause, PipelineError::Terminal(ref t) if t.batch_seq == 2 && t.attempts == 1));
        assert_eq!(abort.report.outcome, RunOutcome::Aborted);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.state(), PipelineState::Aborted);

        let record = h.persisted().await.unwrap();
        assert_eq!(record.completed_keys().len(), 100);
        assert_eq!(record.failed_count(), 0);
        assert!(h.events.kinds().contains(&"run.aborted"));
    }

    #[tokio::test]
    async fn crash_after_k_batches_resumes_with_exactly_the_rest() {
        let data = units(50);

        for k in 0..5usize {
            let h = Harness::new();
            let first = ScriptedSink::healthy();
            let hanging = Arc::new(HangingSink {
                hang_on: k as u64 + 1,
                inner: first.clone(),
            });

            let mut crashed = h.static_run(&data, hanging, 10, RunOptions::default());
            let outcome = tokio::time::timeout(Duration::from_millis(200), crashed.run()).await;
            assert!(outcome.is_err(), "run should still be blocked on batch {}", k + 1);
            drop(crashed);

            assert_eq!(first.delivered_batches(), k);

            let second = ScriptedSink::healthy();
            let report = h
                .static_run(&data, second.clone(), 10, resume())
                .run()
                .await
                .unwrap();

            assert_eq!(second.delivered_keys(), keys(&data[k * 10..]), "k = {k}");
            assert_eq!(report.counters.skipped, (k * 10) as u64);
            assert_eq!(report.outcome, RunOutcome::Completed);
        }
    }

    #[tokio::test]
    async fn resume_after_clean_finish_is_a_no_op() {
        let h = Harness::new();
        let data = units(30);

        h.static_run(&data, ScriptedSink::healthy(), 10, RunOptions::default())
            .run()
            .await
            .unwrap();

        let sink = ScriptedSink::healthy();
        let report = h
            .static_run(&data, sink.clone(), 10, resume())
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::AlreadyComplete);
        assert!(report.is_success());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_run_ignores_previous_completion() {
        let h = Harness::new();
        let data = units(20);

        h.static_run(&data, ScriptedSink::healthy(), 10, RunOptions::default())
            .run()
            .await
            .unwrap();

        let sink = ScriptedSink::healthy();
        let report = h
            .static_run(&data, sink.clone(), 10, RunOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(sink.delivered_keys().len(), 20);
    }

    #[tokio::test]
    async fn cancellation_stops_at_batch_boundary_with_progress_saved() {
        let h = Harness::new();
        let data = units(50);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let sink = ScriptedSink::new(move |batch, _| {
            if batch.seq == 2 {
                trigger.cancel();
            }
            Ok(())
        });

        let mut coordinator = h.coordinator(
            Arc::new(StaticSource::new("static", data.clone())),
            sink.clone(),
            10,
            RunOptions::default(),
            cancel,
        );
        let abort = coordinator.run().await.unwrap_err();

        assert!(matches!(abort.cause, PipelineError::Cancelled));
        assert_eq!(sink.delivered_batches(), 2);
        let record = h.persisted().await.unwrap();
        assert_eq!(record.completed_count(), 20);
    }

    #[tokio::test]
    async fn corrupt_record_aborts_without_overwriting() {
        let h = Harness::new();
        let path = h._dir.path().join("docs.progress.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let sink = ScriptedSink::healthy();
        let abort = h
            .static_run(&units(10), sink.clone(), 5, resume())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            abort.cause,
            PipelineError::State(StateError::Corrupt { .. })
        ));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
    }

    #[tokio::test]
    async fn unreachable_source_aborts() {
        let h = Harness::new();
        let abort = h
            .coordinator(
                Arc::new(UnavailableSource),
                ScriptedSink::healthy(),
                10,
                RunOptions::default(),
                CancellationToken::new(),
            )
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            abort.cause,
            PipelineError::Source(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn limit_covering_every_unit_completes() {
        let h = Harness::new();
        let data = units(30);
        let sink = ScriptedSink::healthy();
        let options = RunOptions {
            resume: false,
            limit: Some(30),
        };

        let report = h
            .static_run(&data, sink.clone(), 10, options)
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.counters.succeeded, 30);
        assert_eq!(sink.delivered_keys(), keys(&data));
        assert!(h.persisted().await.is_none());
        let marker = h.backend.read_marker(TARGET).await.unwrap().unwrap();
        assert_eq!(marker.succeeded, 30);
    }

    #[tokio::test]
    async fn limit_keeps_record_for_the_rest() {
        let h = Harness::new();
        let data = units(50);
        let options = RunOptions {
            resume: false,
            limit: Some(30),
        };

        let report = h
            .static_run(&data, ScriptedSink::healthy(), 10, options)
            .run()
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Limited);
        assert_eq!(report.counters.total, 30);
        assert_eq!(h.persisted().await.unwrap().completed_count(), 30);

        let sink = ScriptedSink::healthy();
        h.static_run(&data, sink.clone(), 10, resume())
            .run()
            .await
            .unwrap();
        assert_eq!(sink.delivered_keys(), keys(&data[30..]));
    }

    #[tokio::test]
    async fn partial_last_batch_is_flushed() {
        let h = Harness::new();
        let data = units(25);
        let sink = ScriptedSink::healthy();

        let report = h
            .static_run(&data, sink.clone(), 10, RunOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(sink.delivered_batches(), 3);
        assert_eq!(report.batches, 3);
        assert_eq!(report.counters.total, 25);
        assert_eq!(
            h.events.kinds(),
            vec!["run.started", "run.completed"]
        );
    }
}
