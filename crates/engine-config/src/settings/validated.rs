use crate::settings::StateBackendKind;
use engine_core::retry::RetryPolicy;
use std::{path::PathBuf, time::Duration};

/// Pipeline settings after validation, with durations resolved.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub batch_size: usize,
    pub sleep_between_batches: Duration,
    pub retry: RetryPolicy,
    pub fetch_size: usize,
    pub resume: bool,
    pub flush_interval: usize,
    pub progress_interval: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub call_timeout: Duration,
    pub stall_timeout: Duration,
    pub chunk_size: usize,
    pub state_dir: PathBuf,
    pub state_backend: StateBackendKind,
    pub event_url: Option<String>,
    pub event_token_env: Option<String>,
    pub event_timeout: Duration,
}

impl RunSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            sleep_between_batches: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            fetch_size: 1000,
            resume: false,
            flush_interval: 1,
            progress_interval: 20,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
            stall_timeout: Duration::from_secs(60),
            chunk_size: 64 * 1024,
            state_dir: default_state_dir(),
            state_backend: StateBackendKind::Json,
            event_url: None,
            event_token_env: None,
            event_timeout: Duration::from_secs(5),
        }
    }
}

/// `<data dir>/ferry/state`, or `.ferry/state` when the platform has none.
pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ferry").join("state"))
        .unwrap_or_else(|| PathBuf::from(".ferry").join("state"))
}
