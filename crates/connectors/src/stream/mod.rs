use crate::error::TransferError;
use async_trait::async_trait;
use tokio::io::AsyncRead;

pub mod http;
pub mod local;

/// A readable byte stream whose total length was declared when it was opened.
pub struct OpenedStream {
    pub total_len: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// Provider of remote files as byte streams (SFTP/FTP/HTTP stand-ins).
///
/// `open` is a fresh connection every time; callers that retry a transfer
/// reopen from scratch.
#[async_trait]
pub trait ByteStreamSource: Send + Sync {
    fn describe(&self) -> String;

    /// Checks that the endpoint is reachable at all.
    async fn probe(&self) -> Result<(), TransferError> {
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<OpenedStream, TransferError>;
}

/// Rejects absolute paths and parent-directory escapes.
pub fn validate_relative(path: &str) -> Result<&str, TransferError> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|seg| seg == "..") {
        return Err(TransferError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        assert!(validate_relative("../etc/passwd").is_err());
        assert!(validate_relative("a/../../b").is_err());
        assert!(validate_relative("").is_err());
        assert_eq!(validate_relative("/Horizon/pricing.csv").unwrap(), "Horizon/pricing.csv");
    }
}
