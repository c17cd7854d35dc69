use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    /// Persisted progress exists but cannot be parsed. Never treated as empty.
    #[error(
        "Progress state for target '{target}' at {location} is unreadable: {reason}. \
         Discard it with `ferry clear --target {target}` to start over"
    )]
    Corrupt {
        target: String,
        location: String,
        reason: String,
    },

    #[error("Invalid target name '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidTarget(String),

    #[error("Failed to serialize progress state: {0}")]
    Serialize(String),

    #[error("I/O error on progress state: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
}
