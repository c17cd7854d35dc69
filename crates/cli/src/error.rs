use engine_config::error::ConfigError;
use engine_processing::error::IntegrityError;
use engine_runtime::error::RuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid env file: {0}")]
    EnvFile(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Verification failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
