use crate::{error::SinkError, sink::BatchSink};
use async_trait::async_trait;
use model::records::{
    batch::Batch,
    unit::{UnitKey, UnitPayload},
};
use serde::Serialize;
use std::path::PathBuf;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

/// Appends one JSON line per unit to a local file. Each batch is written with
/// a single write and synced before `submit` returns.
pub struct JsonLinesSink {
    name: String,
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct Line<'a> {
    target: &'a str,
    batch: u64,
    key: &'a UnitKey,
    #[serde(flatten)]
    payload: &'a UnitPayload,
}

impl JsonLinesSink {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        JsonLinesSink {
            name: name.into(),
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl BatchSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, batch: &Batch) -> Result<(), SinkError> {
        let mut buf = Vec::with_capacity(batch.size_bytes() + batch.len() * 64);
        for unit in &batch.units {
            serde_json::to_writer(
                &mut buf,
                &Line {
                    target: &self.name,
                    batch: batch.seq,
                    key: &unit.key,
                    payload: &unit.payload,
                },
            )?;
            buf.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.sync_data().await?;
        Ok(())
    }
}
