use std::time::Duration;

/// Connect and read timeouts applied to every HTTP client. Both are enforced
/// independently: a slow handshake and a silent socket fail separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
        }
    }
}

pub fn build_client(timeouts: &HttpTimeouts) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}
