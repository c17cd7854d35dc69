use crate::error::SinkError;
use async_trait::async_trait;
use model::records::batch::Batch;

pub mod http;
pub mod jsonl;

/// Upstream that accepts one batch per call (document index, relational
/// store, embedding endpoint). A sink only reports success or failure; it
/// never retries on its own.
#[async_trait]
pub trait BatchSink: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, batch: &Batch) -> Result<(), SinkError>;
}
