use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod overrides;
pub mod validated;
pub mod validator;

/// Contents of a `ferry.toml` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn target(&self, name: &str) -> Result<&TargetConfig, ConfigError> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))
    }

    /// The named target, or every target in file order when `name` is `None`.
    pub fn select_targets(&self, name: Option<&str>) -> Result<Vec<&TargetConfig>, ConfigError> {
        match name {
            Some(name) => Ok(vec![self.target(name)?]),
            None if self.targets.is_empty() => Err(ConfigError::NoTargets),
            None => Ok(self.targets.iter().collect()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = Config::from_toml_str(&content, path)?;
    debug!(path = %path.display(), targets = config.targets.len(), "Loaded configuration");
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackendKind {
    #[default]
    Json,
    Sled,
}

/// `[pipeline]` table. Durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_sleep_between_batches")]
    pub sleep_between_batches: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay")]
    pub base_delay: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: f64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout: f64,
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: f64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub state_backend: StateBackendKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sleep_between_batches: default_sleep_between_batches(),
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            fetch_size: default_fetch_size(),
            resume: false,
            flush_interval: default_flush_interval(),
            progress_interval: default_progress_interval(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            call_timeout: default_call_timeout(),
            stall_timeout: default_stall_timeout(),
            chunk_size: default_chunk_size(),
            state_dir: None,
            state_backend: StateBackendKind::default(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_sleep_between_batches() -> f64 {
    0.1
}
fn default_max_retries() -> usize {
    3
}
fn default_base_delay() -> f64 {
    1.0
}
fn default_max_delay() -> f64 {
    60.0
}
fn default_fetch_size() -> usize {
    1000
}
fn default_flush_interval() -> usize {
    1
}
fn default_progress_interval() -> usize {
    20
}
fn default_connect_timeout() -> f64 {
    10.0
}
fn default_read_timeout() -> f64 {
    30.0
}
fn default_call_timeout() -> f64 {
    120.0
}
fn default_stall_timeout() -> f64 {
    60.0
}
fn default_chunk_size() -> usize {
    64 * 1024
}

/// `[observability]` table. Events go to the log unless `event_url` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub event_url: Option<String>,
    /// Name of the environment variable holding the bearer token.
    #[serde(default)]
    pub event_token_env: Option<String>,
    #[serde(default = "default_event_timeout")]
    pub event_timeout: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            event_url: None,
            event_token_env: None,
            event_timeout: default_event_timeout(),
        }
    }
}

fn default_event_timeout() -> f64 {
    5.0
}

/// One `[[targets]]` entry: a source feeding a sink under its own progress record.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    /// Byte-stream provider used by manifest sources and download sinks.
    #[serde(default)]
    pub stream: Option<StreamConfig>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Csv {
        path: PathBuf,
        #[serde(default)]
        key_column: Option<String>,
        #[serde(default)]
        text_columns: Vec<String>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    Chunks {
        path: PathBuf,
        #[serde(default)]
        chunk_size: Option<usize>,
    },
    Manifest {
        files: Vec<ManifestFile>,
    },
}

fn default_delimiter() -> char {
    ','
}

/// An expected remote file and the CSV header columns it must carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    pub path: String,
    #[serde(default)]
    pub require: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Http {
        url: String,
        /// Name of the environment variable holding the bearer token.
        #[serde(default)]
        token_env: Option<String>,
    },
    Jsonl {
        path: PathBuf,
    },
    Download {
        dest_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamConfig {
    Local { root: PathBuf },
    Http { base_url: String },
}
