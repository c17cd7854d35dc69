use crate::{
    error::SourceError,
    source::{BatchSource, KeyFilter, UnitStream, filtered},
    stream::ByteStreamSource,
};
use async_trait::async_trait;
use model::records::unit::{UnitKey, WorkUnit};
use std::{collections::HashSet, sync::Arc};

/// An ordered list of remote files expected on a byte-stream endpoint.
/// Each file is one unit, keyed by its path.
pub struct ManifestSource {
    name: String,
    files: Vec<String>,
    upstream: Arc<dyn ByteStreamSource>,
}

impl ManifestSource {
    pub fn new(
        name: impl Into<String>,
        files: Vec<String>,
        upstream: Arc<dyn ByteStreamSource>,
    ) -> Self {
        ManifestSource {
            name: name.into(),
            files,
            upstream,
        }
    }
}

#[async_trait]
impl BatchSource for ManifestSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        filter: KeyFilter,
        limit: Option<usize>,
    ) -> Result<UnitStream, SourceError> {
        self.upstream.probe().await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {e}", self.upstream.describe()))
        })?;

        let units: Vec<Result<WorkUnit, SourceError>> = self
            .files
            .iter()
            .map(|path| Ok(WorkUnit::remote_path(path.clone())))
            .collect();
        Ok(filtered(futures_util::stream::iter(units), filter, limit))
    }

    async fn remaining(&self, filter: &HashSet<UnitKey>) -> Result<Option<u64>, SourceError> {
        let n = self
            .files
            .iter()
            .filter(|f| !filter.contains(&UnitKey::from(f.as_str())))
            .count();
        Ok(Some(n as u64))
    }
}
