use crate::{
    error::SinkError,
    http::{HttpTimeouts, build_client},
    sink::BatchSink,
};
use async_trait::async_trait;
use model::records::{batch::Batch, unit::WorkUnit};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

/// Posts each batch as JSON to an HTTP endpoint.
pub struct HttpSink {
    name: String,
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    target: &'a str,
    batch: u64,
    units: &'a [WorkUnit],
}

impl HttpSink {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        token: Option<String>,
        timeouts: &HttpTimeouts,
    ) -> Result<Self, SinkError> {
        let client = build_client(timeouts)
            .map_err(|e| SinkError::Terminal(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpSink {
            name: name.into(),
            url: url.into(),
            token,
            client,
        })
    }
}

/// Maps a non-success status to the sink error the executor classifies.
pub fn status_error(status: StatusCode, body: String) -> SinkError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SinkError::Auth(format!("{status}: {body}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => SinkError::Status {
            status: status.as_u16(),
            body,
        },
        s if s.is_server_error() => SinkError::Status {
            status: s.as_u16(),
            body,
        },
        s => SinkError::Rejected(format!("{s}: {body}")),
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, batch: &Batch) -> Result<(), SinkError> {
        let body = BatchBody {
            target: &self.name,
            batch: batch.seq,
            units: &batch.units,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(SinkError::from_reqwest)?;
        let status = resp.status();
        if status.is_success() {
            debug!(sink = %self.name, batch = batch.seq, status = %status, "Batch accepted");
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_default();
        Err(status_error(status, text))
    }
}
