use thiserror::Error;

/// Errors raised while enumerating work units.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream could not be reached at all.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// A record could not be read or violated the source's key contract.
    #[error("Error reading source record: {0}")]
    Read(String),

    /// The source was configured inconsistently with the upstream data.
    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors returned by a batch sink. Classification into transient and
/// terminal lives with the executor.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Request rejected as malformed: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Adapter-reported failure expected to succeed on retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Adapter-reported failure that retrying cannot fix.
    #[error("Terminal failure: {0}")]
    Terminal(String),
}

impl SinkError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SinkError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            SinkError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            SinkError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SinkError::Rejected(err.to_string())
        }
    }
}

/// Errors raised by byte-stream providers and the chunked reader.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    #[error("Source did not declare a length for {0}")]
    UnknownLength(String),

    #[error("Upstream returned status {status} for {path}")]
    Http { status: u16, path: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// No byte arrived within the stall window.
    #[error("Transfer of {path} stalled: no progress for {secs}s")]
    Stalled { path: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn from_reqwest(err: reqwest::Error, path: &str) -> Self {
        if err.is_timeout() {
            TransferError::Timeout(format!("{path}: {err}"))
        } else if let Some(status) = err.status() {
            TransferError::Http {
                status: status.as_u16(),
                path: path.to_string(),
            }
        } else {
            TransferError::Connection(format!("{path}: {err}"))
        }
    }
}
