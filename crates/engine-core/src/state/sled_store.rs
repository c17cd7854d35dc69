use crate::{error::StateError, state::StateBackend};
use async_trait::async_trait;
use model::progress::record::{CompletionMarker, ProgressRecord};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

/// Stores each target under `progress:<target>` and `done:<target>` as a
/// bincode value in a sled database.
pub struct SledBackend {
    db: sled::Db,
    path: PathBuf,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db = sled::open(path.as_ref())?;
        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    #[inline]
    fn record_key(target: &str) -> String {
        format!("progress:{target}")
    }

    #[inline]
    fn marker_key(target: &str) -> String {
        format!("done:{target}")
    }

    fn get<T: DeserializeOwned>(&self, target: &str, key: &str) -> Result<Option<T>, StateError> {
        let Some(bytes) = self.db.get(key)? else {
            return Ok(None);
        };

        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| StateError::Corrupt {
                target: target.to_string(),
                location: format!("{} [{key}]", self.path.display()),
                reason: e.to_string(),
            })
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StateError> {
        let bytes = bincode::serialize(value).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.db.insert(key, bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        if self.db.remove(key)?.is_some() {
            self.db.flush_async().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateBackend for SledBackend {
    fn describe(&self, target: &str) -> String {
        format!("{} [{}]", self.path.display(), Self::record_key(target))
    }

    async fn read_record(&self, target: &str) -> Result<Option<ProgressRecord>, StateError> {
        self.get(target, &Self::record_key(target))
    }

    async fn write_record(&self, record: &ProgressRecord) -> Result<(), StateError> {
        self.put(&Self::record_key(&record.target), record).await
    }

    async fn delete_record(&self, target: &str) -> Result<(), StateError> {
        self.remove(&Self::record_key(target)).await
    }

    async fn read_marker(&self, target: &str) -> Result<Option<CompletionMarker>, StateError> {
        self.get(target, &Self::marker_key(target))
    }

    async fn write_marker(&self, marker: &CompletionMarker) -> Result<(), StateError> {
        self.put(&Self::marker_key(&marker.target), marker).await
    }

    async fn delete_marker(&self, target: &str) -> Result<(), StateError> {
        self.remove(&Self::marker_key(target)).await
    }
}
