use async_trait::async_trait;
use connectors::http::{HttpTimeouts, build_client};
use model::events::RunEvent;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Receives run lifecycle events. Emitting never blocks the pipeline and
/// never fails it.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);

    /// Waits up to `timeout` for events still in flight.
    async fn flush(&self, _timeout: Duration) {}
}

/// Writes events to the local log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    fn emit(&self, event: RunEvent) {
        let kind = event.event_type();
        let target = event.target().to_string();
        match event.level() {
            "error" => error!(event = kind, target_name = %target, detail = ?event, "Run event"),
            "warning" => warn!(event = kind, target_name = %target, detail = ?event, "Run event"),
            _ => info!(event = kind, target_name = %target, "Run event"),
        }
    }
}

/// Ships events as JSON to a dashboard endpoint on a spawned task. Delivery is
/// best effort: failures are logged and dropped.
#[derive(Clone)]
pub struct HttpEventSink {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
    inflight: TaskTracker,
}

impl HttpEventSink {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = build_client(&HttpTimeouts {
            connect: timeout,
            read: timeout,
        })?;
        Ok(Self {
            client,
            url: url.into(),
            token,
            timeout,
            inflight: TaskTracker::new(),
        })
    }

    async fn deliver(&self, event: &RunEvent) -> Result<(), reqwest::Error> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&envelope(event));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Adds the dotted event name and severity next to the event body.
fn envelope(event: &RunEvent) -> EventEnvelope<'_> {
    EventEnvelope {
        kind: event.event_type(),
        level: event.level(),
        event,
    }
}

#[derive(serde::Serialize)]
struct EventEnvelope<'a> {
    kind: &'static str,
    level: &'static str,
    #[serde(flatten)]
    event: &'a RunEvent,
}

#[async_trait]
impl EventSink for HttpEventSink {
    fn emit(&self, event: RunEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(event = event.event_type(), "No runtime available to ship event");
            return;
        };

        let sink = self.clone();
        handle.spawn(self.inflight.track_future(async move {
            match sink.deliver(&event).await {
                Ok(()) => debug!(event = event.event_type(), "Event delivered"),
                Err(e) => warn!(
                    event = event.event_type(),
                    url = %sink.url,
                    error = %e,
                    "Failed to deliver event"
                ),
            }
        }));
    }

    async fn flush(&self, timeout: Duration) {
        self.inflight.close();
        if tokio::time::timeout(timeout, self.inflight.wait()).await.is_err() {
            warn!(
                pending = self.inflight.len(),
                url = %self.url,
                "Gave up waiting for event delivery"
            );
        }
        self.inflight.reopen();
    }
}

/// Logs every event locally and forwards it to an optional remote sink.
pub struct FanoutEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    fn emit(&self, event: RunEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }

    async fn flush(&self, timeout: Duration) {
        futures::future::join_all(self.sinks.iter().map(|sink| sink.flush(timeout))).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use model::progress::counters::Counters;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Collects events for assertions.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingEventSink {
        pub events: Arc<Mutex<Vec<RunEvent>>>,
    }

    impl RecordingEventSink {
        pub(crate) fn kinds(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type())
                .collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingEventSink {
        fn emit(&self, event: RunEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn completed() -> RunEvent {
        RunEvent::RunCompleted {
            run_id: "r1".into(),
            target: "docs".into(),
            counters: Counters::default(),
            at: Utc::now(),
        }
    }

    #[test]
    fn envelope_carries_kind_and_level() {
        let event = completed();
        let json = serde_json::to_value(envelope(&event)).unwrap();

        assert_eq!(json["kind"], "run.completed");
        assert_eq!(json["level"], "success");
        assert_eq!(json["event"], "run_completed");
        assert_eq!(json["target"], "docs");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = RecordingEventSink::default();
        let b = RecordingEventSink::default();
        let fanout = FanoutEventSink::new(vec![Box::new(a.clone()), Box::new(b.clone())]);

        fanout.emit(completed());

        assert_eq!(a.kinds(), vec!["run.completed"]);
        assert_eq!(b.kinds(), vec!["run.completed"]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_does_not_fail() {
        let sink = HttpEventSink::new(
            "http://127.0.0.1:9/events",
            None,
            Duration::from_millis(200),
        )
        .unwrap();

        sink.emit(completed());
        sink.flush(Duration::from_secs(2)).await;
        sink.deliver(&completed()).await.unwrap_err();
    }

    /// Answers every request with 200 and counts the ones whose headers arrived.
    async fn counting_endpoint() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut seen = Vec::new();
                    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => seen.extend_from_slice(&buf[..n]),
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                        .await;
                });
            }
        });

        (format!("http://{addr}/events"), received)
    }

    #[test]
    fn flush_delivers_events_before_the_runtime_shuts_down() {
        let server = tokio::runtime::Runtime::new().unwrap();
        let (url, received) = server.block_on(counting_endpoint());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let sink = FanoutEventSink::new(vec![
                Box::new(LogEventSink),
                Box::new(HttpEventSink::new(url, None, Duration::from_secs(5)).unwrap()),
            ]);
            sink.emit(completed());
            sink.flush(Duration::from_secs(5)).await;
        });
        drop(runtime);

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
