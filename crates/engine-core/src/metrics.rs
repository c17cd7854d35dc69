use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    bytes_transferred: AtomicU64,
    batches_processed: AtomicU64,
    retry_count: AtomicU64,
    stall_count: AtomicU64,
}

/// Run-scoped throughput counters shared between the executor, the
/// downloader and the coordinator. Cloning shares the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub bytes_transferred: u64,
    pub batches_processed: u64,
    pub retry_count: u64,
    pub stall_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_bytes(&self, count: u64) {
        self.inner
            .bytes_transferred
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner
            .batches_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_stalls(&self, count: u64) {
        self.inner.stall_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_transferred: self.inner.bytes_transferred.load(Ordering::Relaxed),
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            stall_count: self.inner.stall_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
