use crate::error::StateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    progress::record::{CompletionMarker, ProgressRecord, UnitStatus},
    records::unit::UnitKey,
};
use serde::Serialize;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};

pub mod json_store;
pub mod sled_store;

/// Persistence for progress records and completion markers, one slot of each
/// per target. Every write replaces the whole value.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Human readable location of a target's state, used in error messages.
    fn describe(&self, target: &str) -> String;

    async fn read_record(&self, target: &str) -> Result<Option<ProgressRecord>, StateError>;
    async fn write_record(&self, record: &ProgressRecord) -> Result<(), StateError>;
    async fn delete_record(&self, target: &str) -> Result<(), StateError>;

    async fn read_marker(&self, target: &str) -> Result<Option<CompletionMarker>, StateError>;
    async fn write_marker(&self, marker: &CompletionMarker) -> Result<(), StateError>;
    async fn delete_marker(&self, target: &str) -> Result<(), StateError>;
}

/// Target names end up in file names and sled keys.
pub fn validate_target(target: &str) -> Result<(), StateError> {
    let valid = !target.is_empty()
        && target != "."
        && target != ".."
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StateError::InvalidTarget(target.to_string()))
    }
}

/// Snapshot of a target's persisted progress, as shown by `ferry progress`.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub target: String,
    pub location: String,
    pub completed: usize,
    pub failed: usize,
    pub updated_at: Option<DateTime<Utc>>,
    pub finished: Option<CompletionMarker>,
}

/// In-memory progress record for one target, written through to a
/// [`StateBackend`] every `flush_interval` batches.
pub struct ProgressStore {
    target: String,
    backend: Arc<dyn StateBackend>,
    record: ProgressRecord,
    flush_interval: usize,
    unflushed: usize,
}

impl ProgressStore {
    pub fn new(
        target: impl Into<String>,
        backend: Arc<dyn StateBackend>,
        flush_interval: usize,
    ) -> Result<Self, StateError> {
        let target = target.into();
        validate_target(&target)?;

        Ok(Self {
            record: ProgressRecord::empty(target.clone()),
            target,
            backend,
            flush_interval: flush_interval.max(1),
            unflushed: 0,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn location(&self) -> String {
        self.backend.describe(&self.target)
    }

    pub fn flush_interval(&self) -> usize {
        self.flush_interval
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    /// Loads the persisted record, or an empty one when nothing was saved.
    pub async fn load(&mut self) -> Result<&ProgressRecord, StateError> {
        self.record = match self.backend.read_record(&self.target).await? {
            Some(record) => {
                info!(
                    target_name = %self.target,
                    completed = record.completed_count(),
                    failed = record.failed_count(),
                    "Loaded progress record"
                );
                record
            }
            None => ProgressRecord::empty(self.target.clone()),
        };
        self.unflushed = 0;
        Ok(&self.record)
    }

    /// Drops any previous record and completion marker for a non-resume run.
    pub async fn start_fresh(&mut self) -> Result<(), StateError> {
        self.backend.delete_marker(&self.target).await?;
        self.backend.delete_record(&self.target).await?;
        self.record = ProgressRecord::empty(self.target.clone());
        self.unflushed = 0;
        Ok(())
    }

    pub async fn record_completed(&mut self, keys: &[UnitKey]) -> Result<(), StateError> {
        self.record_batch(keys, UnitStatus::Completed).await
    }

    pub async fn record_failed(&mut self, keys: &[UnitKey]) -> Result<(), StateError> {
        self.record_batch(keys, UnitStatus::Failed).await
    }

    async fn record_batch(&mut self, keys: &[UnitKey], status: UnitStatus) -> Result<(), StateError> {
        let changed = self.record.mark(keys, status);
        self.unflushed += 1;
        debug!(target_name = %self.target, ?status, keys = keys.len(), changed, "Recorded batch");

        if self.unflushed >= self.flush_interval {
            self.flush().await?;
        }
        Ok(())
    }

    /// Rewrites the whole record through the backend.
    pub async fn flush(&mut self) -> Result<(), StateError> {
        self.backend.write_record(&self.record).await?;
        self.unflushed = 0;
        Ok(())
    }

    pub fn completed_keys(&self) -> HashSet<UnitKey> {
        self.record.completed_keys()
    }

    /// Deletes the persisted record and marker without marking anything done.
    pub async fn clear(&mut self) -> Result<(), StateError> {
        self.backend.delete_record(&self.target).await?;
        self.backend.delete_marker(&self.target).await?;
        self.record = ProgressRecord::empty(self.target.clone());
        self.unflushed = 0;
        info!(target_name = %self.target, "Cleared progress state");
        Ok(())
    }

    /// Called after a run with zero failures. The marker goes down before the
    /// record is removed, so a crash in between still resumes as complete.
    pub async fn finish_clean(&mut self, succeeded: u64) -> Result<CompletionMarker, StateError> {
        let marker = CompletionMarker {
            target: self.target.clone(),
            finished_at: Utc::now(),
            succeeded,
        };
        self.backend.write_marker(&marker).await?;
        self.backend.delete_record(&self.target).await?;
        self.record = ProgressRecord::empty(self.target.clone());
        self.unflushed = 0;
        Ok(marker)
    }

    pub async fn completion_marker(&self) -> Result<Option<CompletionMarker>, StateError> {
        self.backend.read_marker(&self.target).await
    }

    /// Reads persisted state without touching the in-memory record.
    pub async fn summary(&self) -> Result<ProgressSummary, StateError> {
        let record = self.backend.read_record(&self.target).await?;
        let finished = self.backend.read_marker(&self.target).await?;

        Ok(ProgressSummary {
            target: self.target.clone(),
            location: self.location(),
            completed: record.as_ref().map_or(0, |r| r.completed_count()),
            failed: record.as_ref().map_or(0, |r| r.failed_count()),
            updated_at: record.map(|r| r.updated_at),
            finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::json_store::JsonFileBackend;
    use tempfile::tempdir;

    fn keys(range: std::ops::Range<u64>) -> Vec<UnitKey> {
        range.map(UnitKey::seq).collect()
    }

    #[test]
    fn target_names_are_restricted() {
        assert!(validate_target("docs-2024_v1.csv").is_ok());
        assert!(validate_target("").is_err());
        assert!(validate_target("..").is_err());
        assert!(validate_target("a/b").is_err());
        assert!(validate_target("a b").is_err());
    }

    #[tokio::test]
    async fn every_record_call_is_durable_with_default_interval() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StateBackend> = Arc::new(JsonFileBackend::new(dir.path()));

        let mut store = ProgressStore::new("docs", backend.clone(), 1).unwrap();
        store.record_completed(&keys(0..3)).await.unwrap();
        store.record_failed(&keys(3..4)).await.unwrap();

        // A second store stands in for a restarted process.
        let mut reopened = ProgressStore::new("docs", backend, 1).unwrap();
        let record = reopened.load().await.unwrap();
        assert_eq!(record.completed_count(), 3);
        assert_eq!(record.failed_count(), 1);
    }

    #[tokio::test]
    async fn flush_interval_defers_writes() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StateBackend> = Arc::new(JsonFileBackend::new(dir.path()));

        let mut store = ProgressStore::new("docs", backend.clone(), 3).unwrap();
        store.record_completed(&keys(0..2)).await.unwrap();
        store.record_completed(&keys(2..4)).await.unwrap();
        assert!(backend.read_record("docs").await.unwrap().is_none());

        store.record_completed(&keys(4..6)).await.unwrap();
        let persisted = backend.read_record("docs").await.unwrap().unwrap();
        assert_eq!(persisted.completed_count(), 6);
    }

    #[tokio::test]
    async fn finish_clean_replaces_record_with_marker() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StateBackend> = Arc::new(JsonFileBackend::new(dir.path()));

        let mut store = ProgressStore::new("docs", backend.clone(), 1).unwrap();
        store.record_completed(&keys(0..5)).await.unwrap();
        let marker = store.finish_clean(5).await.unwrap();

        assert_eq!(marker.succeeded, 5);
        assert!(backend.read_record("docs").await.unwrap().is_none());
        assert_eq!(store.completion_marker().await.unwrap(), Some(marker));

        store.start_fresh().await.unwrap();
        assert!(store.completion_marker().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_reports_persisted_counts() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StateBackend> = Arc::new(JsonFileBackend::new(dir.path()));

        let mut store = ProgressStore::new("docs", backend, 1).unwrap();
        store.record_completed(&keys(0..4)).await.unwrap();
        store.record_failed(&keys(4..6)).await.unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.failed, 2);
        assert!(summary.updated_at.is_some());
        assert!(summary.finished.is_none());
    }
}
