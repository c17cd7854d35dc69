use crate::{
    error::TransferError,
    stream::{ByteStreamSource, OpenedStream, validate_relative},
};
use async_trait::async_trait;
use std::{io::ErrorKind, path::PathBuf};

/// Files under a local (or mounted) root directory.
pub struct LocalByteSource {
    root: PathBuf,
}

impl LocalByteSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalByteSource { root: root.into() }
    }
}

#[async_trait]
impl ByteStreamSource for LocalByteSource {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn probe(&self) -> Result<(), TransferError> {
        let meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| TransferError::Connection(format!("{}: {e}", self.root.display())))?;
        if !meta.is_dir() {
            return Err(TransferError::Connection(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<OpenedStream, TransferError> {
        let full = self.root.join(validate_relative(path)?);
        let file = tokio::fs::File::open(&full).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransferError::NotFound(path.to_string()),
            _ => TransferError::Io(e),
        })?;
        let total_len = file.metadata().await?.len();

        Ok(OpenedStream {
            total_len,
            reader: Box::new(file),
        })
    }
}
