use connectors::{error::TransferError, stream::ByteStreamSource};
use engine_core::metrics::Metrics;
use model::transfer::TransferDescriptor;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, warn};

/// Called after every chunk with `(bytes_so_far, declared_total)`.
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// A finished (but not yet verified) download sitting at `part_path`.
#[derive(Debug)]
pub struct PartialDownload {
    pub descriptor: TransferDescriptor,
    pub part_path: PathBuf,
}

/// Chunked reader with a stall watchdog. Each call to [`Downloader::download`]
/// opens the stream from scratch and truncates the `.part` file.
#[derive(Clone)]
pub struct Downloader {
    source: Arc<dyn ByteStreamSource>,
    chunk_size: usize,
    stall_timeout: Duration,
    metrics: Metrics,
}

impl Downloader {
    pub fn new(
        source: Arc<dyn ByteStreamSource>,
        chunk_size: usize,
        stall_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            stall_timeout,
            metrics,
        }
    }

    pub fn source(&self) -> &Arc<dyn ByteStreamSource> {
        &self.source
    }

    pub fn part_path(dest: &Path) -> PathBuf {
        let mut name = dest.as_os_str().to_os_string();
        name.push(".part");
        PathBuf::from(name)
    }

    pub async fn download(
        &self,
        path: &str,
        dest: &Path,
        on_progress: &ProgressFn<'_>,
    ) -> Result<PartialDownload, TransferError> {
        let mut opened = self.source.open(path).await?;
        let mut descriptor = TransferDescriptor::new(path, opened.total_len);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part_path = Self::part_path(dest);
        let mut file = File::create(&part_path).await?;
        let mut buf = vec![0u8; self.chunk_size];

        debug!(path, total = opened.total_len, dest = %dest.display(), "Starting download");

        loop {
            let read = match timeout(self.stall_timeout, opened.reader.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    self.metrics.increment_stalls(1);
                    warn!(
                        path,
                        bytes = descriptor.bytes_written,
                        stall_secs = self.stall_timeout.as_secs(),
                        "Download stalled"
                    );
                    return Err(TransferError::Stalled {
                        path: path.to_string(),
                        secs: self.stall_timeout.as_secs(),
                    });
                }
            };

            if read == 0 {
                break;
            }

            file.write_all(&buf[..read]).await?;
            descriptor.advance(read as u64);
            self.metrics.increment_bytes(read as u64);
            on_progress(descriptor.bytes_written, descriptor.declared_len);
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(PartialDownload {
            descriptor,
            part_path,
        })
    }

    /// Moves a verified `.part` file into place.
    pub async fn finalize(partial: &PartialDownload, dest: &Path) -> Result<(), TransferError> {
        tokio::fs::rename(&partial.part_path, dest).await?;
        Ok(())
    }
}
