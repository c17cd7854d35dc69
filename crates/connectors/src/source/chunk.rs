use crate::{
    error::SourceError,
    source::{BatchSource, KeyFilter, UnitStream},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use model::records::unit::{UnitKey, UnitPayload, WorkUnit};
use std::{collections::HashSet, io::SeekFrom, path::PathBuf};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// Fixed-size byte ranges of a file, keyed by 0-based chunk sequence number.
/// Chunks already completed are seeked over rather than read.
pub struct ChunkSource {
    name: String,
    path: PathBuf,
    chunk_size: usize,
}

struct ChunkCursor {
    file: File,
    seq: u64,
    chunk_count: u64,
    chunk_size: usize,
    filter: KeyFilter,
    failed: bool,
}

impl ChunkSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        ChunkSource {
            name: name.into(),
            path: path.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    async fn chunk_count(&self) -> Result<u64, SourceError> {
        let len = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.path.display())))?
            .len();
        Ok(len.div_ceil(self.chunk_size as u64))
    }
}

impl ChunkCursor {
    async fn next_unit(&mut self) -> Option<Result<WorkUnit, SourceError>> {
        if self.failed {
            return None;
        }
        while self.seq < self.chunk_count && self.filter.contains(&UnitKey::seq(self.seq)) {
            self.seq += 1;
        }
        if self.seq >= self.chunk_count {
            return None;
        }

        let offset = self.seq * self.chunk_size as u64;
        let result = self.read_at(offset).await;
        self.seq += 1;
        match result {
            Ok(bytes) => Some(Ok(WorkUnit::new(
                UnitKey::seq(self.seq - 1),
                UnitPayload::Chunk { offset, bytes },
            ))),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    async fn read_at(&mut self, offset: u64) -> Result<Vec<u8>, SourceError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

#[async_trait]
impl BatchSource for ChunkSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        filter: KeyFilter,
        limit: Option<usize>,
    ) -> Result<UnitStream, SourceError> {
        let chunk_count = self.chunk_count().await?;
        let file = File::open(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.path.display())))?;

        let cursor = ChunkCursor {
            file,
            seq: 0,
            chunk_count,
            chunk_size: self.chunk_size,
            filter,
            failed: false,
        };

        let stream = futures_util::stream::unfold(cursor, |mut cursor| async move {
            cursor.next_unit().await.map(|item| (item, cursor))
        });

        Ok(match limit {
            Some(n) => stream.take(n).boxed(),
            None => stream.boxed(),
        })
    }

    async fn remaining(&self, filter: &HashSet<UnitKey>) -> Result<Option<u64>, SourceError> {
        let count = self.chunk_count().await?;
        let done = (0..count).filter(|s| filter.contains(&UnitKey::seq(*s))).count() as u64;
        Ok(Some(count - done))
    }
}
