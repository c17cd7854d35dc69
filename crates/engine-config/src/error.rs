use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating `ferry.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value '{value}' for {var}: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    ValidationFailed(Vec<String>),

    #[error("No target named '{0}' in configuration")]
    UnknownTarget(String),

    #[error("Configuration defines no targets")]
    NoTargets,
}
