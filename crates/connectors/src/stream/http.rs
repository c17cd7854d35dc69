use crate::{
    error::TransferError,
    http::{HttpTimeouts, build_client},
    stream::{ByteStreamSource, OpenedStream, validate_relative},
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::StatusCode;
use tokio_util::io::StreamReader;

/// Files served over HTTP(S) below a base URL.
pub struct HttpByteSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpByteSource {
    pub fn new(base_url: impl Into<String>, timeouts: &HttpTimeouts) -> Result<Self, TransferError> {
        let client = build_client(timeouts)
            .map_err(|e| TransferError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpByteSource {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, path: &str) -> Result<String, TransferError> {
        Ok(format!("{}/{}", self.base_url, validate_relative(path)?))
    }
}

#[async_trait]
impl ByteStreamSource for HttpByteSource {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    async fn probe(&self) -> Result<(), TransferError> {
        let resp = self
            .client
            .head(&self.base_url)
            .send()
            .await
            .map_err(|e| TransferError::from_reqwest(e, &self.base_url))?;
        if resp.status().is_server_error() {
            return Err(TransferError::Http {
                status: resp.status().as_u16(),
                path: self.base_url.clone(),
            });
        }
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<OpenedStream, TransferError> {
        let url = self.url_for(path)?;
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransferError::from_reqwest(e, path))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(TransferError::NotFound(path.to_string())),
            status if !status.is_success() => {
                return Err(TransferError::Http {
                    status: status.as_u16(),
                    path: path.to_string(),
                });
            }
            _ => {}
        }

        let total_len = resp
            .content_length()
            .ok_or_else(|| TransferError::UnknownLength(path.to_string()))?;
        let body = resp.bytes_stream().map_err(std::io::Error::other);

        Ok(OpenedStream {
            total_len,
            reader: Box::new(StreamReader::new(Box::pin(body))),
        })
    }
}
