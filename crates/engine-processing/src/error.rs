use connectors::error::SinkError;
use model::records::unit::UnitKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Fewer (or more) bytes landed than the source declared.
    #[error("Incomplete transfer of {path}: expected {expected} bytes, found {actual}")]
    Incomplete {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("{path} is missing required columns: {}", .missing.join(", "))]
    SchemaMismatch { path: String, missing: Vec<String> },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read CSV header of {path}: {source}")]
    Header {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl IntegrityError {
    /// Only an incomplete or unreadable download is worth fetching again.
    pub fn is_transient(&self) -> bool {
        matches!(self, IntegrityError::Incomplete { .. } | IntegrityError::Io { .. })
    }
}

impl From<IntegrityError> for SinkError {
    fn from(err: IntegrityError) -> Self {
        if err.is_transient() {
            SinkError::Transient(err.to_string())
        } else {
            SinkError::Terminal(err.to_string())
        }
    }
}

/// A batch failed in a way retrying cannot fix. Carries the keys that stay
/// pending so the caller can report them.
#[derive(Debug, Error)]
#[error("Batch {batch_seq} failed terminally after {attempts} attempt(s): {source}")]
pub struct TerminalBatchError {
    pub batch_seq: u64,
    pub keys: Vec<UnitKey>,
    pub attempts: usize,
    #[source]
    pub source: SinkError,
}
