use crate::{error::StateError, state::StateBackend};
use async_trait::async_trait;
use model::progress::record::{CompletionMarker, ProgressRecord};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};

/// One JSON document per target and kind under a state directory:
/// `<target>.progress.json` and `<target>.done.json`.
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{target}.progress.json"))
    }

    pub fn marker_path(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{target}.done.json"))
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        target: &str,
        path: &Path,
    ) -> Result<Option<T>, StateError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StateError::Corrupt {
                target: target.to_string(),
                location: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Writes to a sibling temp file, syncs it and renames it over `path`, so
    /// readers see either the old or the new document.
    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StateError> {
        fs::create_dir_all(&self.dir).await?;

        let bytes =
            serde_json::to_vec_pretty(value).map_err(|e| StateError::Serialize(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn remove(path: &Path) -> Result<(), StateError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn wrong_target(target: &str, found: &str, path: &Path) -> StateError {
    StateError::Corrupt {
        target: target.to_string(),
        location: path.display().to_string(),
        reason: format!("document belongs to target '{found}'"),
    }
}

#[async_trait]
impl StateBackend for JsonFileBackend {
    fn describe(&self, target: &str) -> String {
        self.record_path(target).display().to_string()
    }

    async fn read_record(&self, target: &str) -> Result<Option<ProgressRecord>, StateError> {
        let path = self.record_path(target);
        let record: Option<ProgressRecord> = self.read_json(target, &path).await?;
        match record {
            Some(r) if r.target != target => Err(wrong_target(target, &r.target, &path)),
            other => Ok(other),
        }
    }

    async fn write_record(&self, record: &ProgressRecord) -> Result<(), StateError> {
        self.write_json(&self.record_path(&record.target), record)
            .await
    }

    async fn delete_record(&self, target: &str) -> Result<(), StateError> {
        Self::remove(&self.record_path(target)).await
    }

    async fn read_marker(&self, target: &str) -> Result<Option<CompletionMarker>, StateError> {
        let path = self.marker_path(target);
        let marker: Option<CompletionMarker> = self.read_json(target, &path).await?;
        match marker {
            Some(m) if m.target != target => Err(wrong_target(target, &m.target, &path)),
            other => Ok(other),
        }
    }

    async fn write_marker(&self, marker: &CompletionMarker) -> Result<(), StateError> {
        self.write_json(&self.marker_path(&marker.target), marker)
            .await
    }

    async fn delete_marker(&self, target: &str) -> Result<(), StateError> {
        Self::remove(&self.marker_path(target)).await
    }
}
