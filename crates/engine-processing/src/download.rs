use crate::{integrity::IntegrityChecker, transfer::Downloader};
use async_trait::async_trait;
use connectors::{
    error::SinkError,
    sink::BatchSink,
    stream::validate_relative,
};
use model::records::{batch::Batch, unit::UnitPayload};
use std::{collections::HashMap, path::PathBuf};
use tracing::{info, trace};

/// Downloads every remote path in a batch into `dest_dir`, verifying length
/// and required CSV columns before moving each file into place. The batch
/// succeeds only when every file verified.
pub struct DownloadSink {
    name: String,
    downloader: Downloader,
    dest_dir: PathBuf,
    required: HashMap<String, Vec<String>>,
}

impl DownloadSink {
    pub fn new(
        name: impl Into<String>,
        downloader: Downloader,
        dest_dir: impl Into<PathBuf>,
        required: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            downloader,
            dest_dir: dest_dir.into(),
            required,
        }
    }

    async fn fetch(&self, path: &str) -> Result<(), SinkError> {
        let dest = self.dest_dir.join(validate_relative(path)?);
        let required = self.required.get(path).map(Vec::as_slice).unwrap_or(&[]);

        let partial = self
            .downloader
            .download(path, &dest, &|done: u64, total: u64| {
                trace!(path, done, total, "Download progress");
            })
            .await?;

        IntegrityChecker::verify(partial.descriptor.declared_len, &partial.part_path, required)
            .await?;
        Downloader::finalize(&partial, &dest).await?;

        info!(
            sink = %self.name,
            path,
            bytes = partial.descriptor.bytes_written,
            dest = %dest.display(),
            "File downloaded and verified"
        );
        Ok(())
    }
}

#[async_trait]
impl BatchSink for DownloadSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, batch: &Batch) -> Result<(), SinkError> {
        for unit in &batch.units {
            match &unit.payload {
                UnitPayload::RemotePath { path } => self.fetch(path).await?,
                other => {
                    return Err(SinkError::Terminal(format!(
                        "download sink cannot handle unit '{}' with payload {other:?}",
                        unit.key
                    )));
                }
            }
        }
        Ok(())
    }
}
