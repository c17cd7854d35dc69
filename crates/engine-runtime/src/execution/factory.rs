use crate::{
    error::RuntimeError,
    events::{EventSink, FanoutEventSink, HttpEventSink, LogEventSink},
};
use connectors::{
    http::HttpTimeouts,
    sink::{BatchSink, http::HttpSink, jsonl::JsonLinesSink},
    source::{
        BatchSource,
        chunk::ChunkSource,
        csv::{CsvSource, CsvSourceConfig},
        manifest::ManifestSource,
    },
    stream::{ByteStreamSource, http::HttpByteSource, local::LocalByteSource},
};
use engine_config::settings::{
    SinkConfig, SourceConfig, StateBackendKind, StreamConfig, TargetConfig,
    validated::RunSettings,
};
use engine_core::{
    metrics::Metrics,
    state::{StateBackend, json_store::JsonFileBackend, sled_store::SledBackend},
};
use engine_processing::{download::DownloadSink, transfer::Downloader};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

/// File name of the sled database inside the state directory.
pub const SLED_DB_NAME: &str = "ferry.sled";

pub fn open_backend(settings: &RunSettings) -> Result<Arc<dyn StateBackend>, RuntimeError> {
    let backend: Arc<dyn StateBackend> = match settings.state_backend {
        StateBackendKind::Json => Arc::new(JsonFileBackend::new(&settings.state_dir)),
        StateBackendKind::Sled => {
            std::fs::create_dir_all(&settings.state_dir).map_err(engine_core::error::StateError::from)?;
            Arc::new(SledBackend::open(settings.state_dir.join(SLED_DB_NAME))?)
        }
    };
    Ok(backend)
}

fn timeouts(settings: &RunSettings) -> HttpTimeouts {
    HttpTimeouts {
        connect: settings.connect_timeout,
        read: settings.read_timeout,
    }
}

pub fn create_stream(
    target: &TargetConfig,
    settings: &RunSettings,
) -> Result<Option<Arc<dyn ByteStreamSource>>, RuntimeError> {
    let stream: Option<Arc<dyn ByteStreamSource>> = match &target.stream {
        None => None,
        Some(StreamConfig::Local { root }) => Some(Arc::new(LocalByteSource::new(root))),
        Some(StreamConfig::Http { base_url }) => {
            Some(Arc::new(HttpByteSource::new(base_url, &timeouts(settings))?))
        }
    };
    Ok(stream)
}

fn require_stream(
    target: &TargetConfig,
    stream: &Option<Arc<dyn ByteStreamSource>>,
) -> Result<Arc<dyn ByteStreamSource>, RuntimeError> {
    stream.clone().ok_or_else(|| {
        RuntimeError::Config(engine_config::error::ConfigError::ValidationFailed(vec![
            format!("targets.{} needs a `stream` provider", target.name),
        ]))
    })
}

pub fn create_source(
    target: &TargetConfig,
    settings: &RunSettings,
    stream: &Option<Arc<dyn ByteStreamSource>>,
) -> Result<Arc<dyn BatchSource>, RuntimeError> {
    let source: Arc<dyn BatchSource> = match &target.source {
        SourceConfig::Csv {
            path,
            key_column,
            text_columns,
            delimiter,
        } => {
            let mut config = CsvSourceConfig::new(path);
            config.key_column = key_column.clone();
            config.text_columns = text_columns.clone();
            config.delimiter = u8::try_from(*delimiter).unwrap_or(b',');
            config.fetch_size = settings.fetch_size;
            Arc::new(CsvSource::new(&target.name, config))
        }
        SourceConfig::Chunks { path, chunk_size } => Arc::new(ChunkSource::new(
            &target.name,
            path,
            chunk_size.unwrap_or(settings.chunk_size),
        )),
        SourceConfig::Manifest { files } => Arc::new(ManifestSource::new(
            &target.name,
            files.iter().map(|f| f.path.clone()).collect(),
            require_stream(target, stream)?,
        )),
    };
    Ok(source)
}

pub fn create_sink(
    target: &TargetConfig,
    settings: &RunSettings,
    env: &HashMap<String, String>,
    stream: &Option<Arc<dyn ByteStreamSource>>,
    metrics: &Metrics,
) -> Result<Arc<dyn BatchSink>, RuntimeError> {
    let sink: Arc<dyn BatchSink> = match &target.sink {
        SinkConfig::Http { url, token_env } => {
            let token = token_env
                .as_deref()
                .map(|var| lookup_env(env, var))
                .transpose()?;
            Arc::new(HttpSink::new(&target.name, url, token, &timeouts(settings))?)
        }
        SinkConfig::Jsonl { path } => Arc::new(JsonLinesSink::new(&target.name, path)),
        SinkConfig::Download { dest_dir } => {
            let downloader = Downloader::new(
                require_stream(target, stream)?,
                settings.chunk_size,
                settings.stall_timeout,
                metrics.clone(),
            );
            Arc::new(DownloadSink::new(
                &target.name,
                downloader,
                dest_dir,
                required_columns(&target.source),
            ))
        }
    };
    Ok(sink)
}

/// Required CSV header columns per manifest path.
fn required_columns(source: &SourceConfig) -> HashMap<String, Vec<String>> {
    match source {
        SourceConfig::Manifest { files } => files
            .iter()
            .filter(|f| !f.require.is_empty())
            .map(|f| (f.path.clone(), f.require.clone()))
            .collect(),
        _ => HashMap::new(),
    }
}

/// Always logs locally; also ships to `event_url` when configured.
pub fn create_event_sink(
    settings: &RunSettings,
    env: &HashMap<String, String>,
) -> Arc<dyn EventSink> {
    let Some(url) = &settings.event_url else {
        return Arc::new(LogEventSink);
    };

    let token = settings
        .event_token_env
        .as_deref()
        .and_then(|var| env.get(var).cloned());

    match HttpEventSink::new(url, token, settings.event_timeout) {
        Ok(http) => {
            info!(url = %url, "Shipping run events");
            Arc::new(FanoutEventSink::new(vec![
                Box::new(LogEventSink),
                Box::new(http),
            ]))
        }
        Err(e) => {
            warn!(error = %e, "Event endpoint unusable, logging events locally only");
            Arc::new(LogEventSink)
        }
    }
}

fn lookup_env(env: &HashMap<String, String>, var: &str) -> Result<String, RuntimeError> {
    env.get(var)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| RuntimeError::MissingEnv(var.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::settings::Config;
    use std::path::Path;

    fn target(toml: &str) -> TargetConfig {
        let config = Config::from_toml_str(toml, Path::new("ferry.toml")).unwrap();
        config.targets[0].clone()
    }

    #[test]
    fn http_sink_token_must_be_present() {
        let target = target(
            r#"
            [[targets]]
            name = "embed"
            source = { kind = "csv", path = "rows.csv" }
            sink = { kind = "http", url = "http://localhost:1/embed", token_env = "EMBED_TOKEN" }
            "#,
        );

        let err = create_sink(
            &target,
            &RunSettings::default(),
            &HashMap::new(),
            &None,
            &Metrics::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RuntimeError::MissingEnv(var) if var == "EMBED_TOKEN"));
    }

    #[test]
    fn manifest_required_columns_follow_files() {
        let target = target(
            r#"
            [[targets]]
            name = "ingest"
            stream = { kind = "local", root = "/srv/outbox" }
            sink = { kind = "download", dest_dir = "downloads" }

            [targets.source]
            kind = "manifest"
            files = [
                { path = "members.csv", require = ["member_id"] },
                { path = "notes.txt" },
            ]
            "#,
        );

        let required = required_columns(&target.source);
        assert_eq!(required.len(), 1);
        assert_eq!(required["members.csv"], vec!["member_id"]);

        let stream = create_stream(&target, &RunSettings::default()).unwrap();
        assert!(create_source(&target, &RunSettings::default(), &stream).is_ok());
        assert!(
            create_sink(
                &target,
                &RunSettings::default(),
                &HashMap::new(),
                &stream,
                &Metrics::new()
            )
            .is_ok()
        );
    }

    #[test]
    fn no_event_url_logs_locally() {
        let sink = create_event_sink(&RunSettings::default(), &HashMap::new());
        sink.emit(model::events::RunEvent::RunStarted {
            run_id: "r".into(),
            target: "t".into(),
            resume: false,
            at: chrono::Utc::now(),
        });
    }
}
