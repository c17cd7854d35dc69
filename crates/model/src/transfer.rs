use serde::{Deserialize, Serialize};

/// Identifies a source byte stream and how much of it reached the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub source_path: String,
    /// Length announced by the source when the stream was opened.
    pub declared_len: u64,
    pub bytes_written: u64,
}

impl TransferDescriptor {
    pub fn new(source_path: impl Into<String>, declared_len: u64) -> Self {
        TransferDescriptor {
            source_path: source_path.into(),
            declared_len,
            bytes_written: 0,
        }
    }

    pub fn advance(&mut self, n: u64) {
        self.bytes_written += n;
    }

    pub fn is_complete(&self) -> bool {
        self.declared_len == self.bytes_written
    }
}
