use crate::{
    error::ConfigError,
    settings::{
        Config, SinkConfig, SourceConfig, TargetConfig,
        validated::{RunSettings, default_state_dir},
    },
};
use engine_core::{retry::RetryPolicy, state::validate_target};
use std::{collections::HashSet, time::Duration};
use tracing::{info, warn};

const LARGE_BATCH_WARNING: usize = 100_000;

/// Checks a parsed [`Config`] and resolves it into [`RunSettings`].
pub struct SettingsValidator<'a> {
    config: &'a Config,
}

impl<'a> SettingsValidator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn validate(&self) -> Result<RunSettings, ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_pipeline(&mut errors);
        self.validate_targets(&mut errors);

        if !errors.is_empty() {
            return Err(ConfigError::ValidationFailed(errors));
        }

        let settings = self.resolve();
        info!(
            batch_size = settings.batch_size,
            max_retries = settings.retry.max_attempts,
            state_dir = %settings.state_dir.display(),
            backend = ?settings.state_backend,
            "Settings validated"
        );
        Ok(settings)
    }

    /// Settings for one target, with its batch size override applied.
    pub fn for_target(settings: &RunSettings, target: &TargetConfig) -> RunSettings {
        match target.batch_size {
            Some(size) => settings.clone().with_batch_size(size),
            None => settings.clone(),
        }
    }

    fn validate_pipeline(&self, errors: &mut Vec<String>) {
        let p = &self.config.pipeline;

        if p.batch_size == 0 {
            errors.push("pipeline.batch_size must be > 0".to_string());
        } else if p.batch_size > LARGE_BATCH_WARNING {
            warn!(batch_size = p.batch_size, "Batch size is very large, may cause memory issues");
        }
        if p.max_retries == 0 {
            errors.push("pipeline.max_retries must be > 0".to_string());
        }
        if p.fetch_size == 0 {
            errors.push("pipeline.fetch_size must be > 0".to_string());
        }
        if p.chunk_size == 0 {
            errors.push("pipeline.chunk_size must be > 0".to_string());
        }
        if p.flush_interval == 0 {
            errors.push("pipeline.flush_interval must be > 0".to_string());
        }
        if p.progress_interval == 0 {
            errors.push("pipeline.progress_interval must be > 0".to_string());
        }

        let non_negative = [
            ("sleep_between_batches", p.sleep_between_batches),
            ("base_delay", p.base_delay),
            ("max_delay", p.max_delay),
        ];
        for (name, secs) in non_negative {
            if Duration::try_from_secs_f64(secs).is_err() {
                errors.push(format!("pipeline.{name} must be a non-negative number of seconds"));
            }
        }

        let positive = [
            ("pipeline.connect_timeout", p.connect_timeout),
            ("pipeline.read_timeout", p.read_timeout),
            ("pipeline.call_timeout", p.call_timeout),
            ("pipeline.stall_timeout", p.stall_timeout),
            ("observability.event_timeout", self.config.observability.event_timeout),
        ];
        for (name, secs) in positive {
            if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                errors.push(format!("{name} must be a positive number of seconds"));
            }
        }
    }

    fn validate_targets(&self, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();

        for target in &self.config.targets {
            let name = &target.name;
            if let Err(e) = validate_target(name) {
                errors.push(e.to_string());
            }
            if !seen.insert(name.as_str()) {
                errors.push(format!("target '{name}' is defined more than once"));
            }
            if target.batch_size == Some(0) {
                errors.push(format!("targets.{name}.batch_size must be > 0"));
            }

            match &target.source {
                SourceConfig::Chunks {
                    chunk_size: Some(0),
                    ..
                } => errors.push(format!("targets.{name}.source.chunk_size must be > 0")),
                SourceConfig::Manifest { files } if files.is_empty() => {
                    errors.push(format!("targets.{name}.source.files must not be empty"))
                }
                SourceConfig::Csv { delimiter, .. } if !delimiter.is_ascii() => {
                    errors.push(format!("targets.{name}.source.delimiter must be ASCII"))
                }
                _ => {}
            }

            let needs_stream = matches!(target.source, SourceConfig::Manifest { .. })
                || matches!(target.sink, SinkConfig::Download { .. });
            if needs_stream && target.stream.is_none() {
                errors.push(format!(
                    "targets.{name} needs a `stream` provider for its manifest source or download sink"
                ));
            }
            if matches!(target.sink, SinkConfig::Download { .. })
                && !matches!(target.source, SourceConfig::Manifest { .. })
            {
                errors.push(format!(
                    "targets.{name}: the download sink only accepts a manifest source"
                ));
            }
        }
    }

    fn resolve(&self) -> RunSettings {
        let p = &self.config.pipeline;
        let obs = &self.config.observability;

        RunSettings {
            batch_size: p.batch_size,
            sleep_between_batches: Duration::from_secs_f64(p.sleep_between_batches),
            retry: RetryPolicy::new(
                p.max_retries,
                Duration::from_secs_f64(p.base_delay),
                Duration::from_secs_f64(p.max_delay),
            ),
            fetch_size: p.fetch_size,
            resume: p.resume,
            flush_interval: p.flush_interval,
            progress_interval: p.progress_interval,
            connect_timeout: Duration::from_secs_f64(p.connect_timeout),
            read_timeout: Duration::from_secs_f64(p.read_timeout),
            call_timeout: Duration::from_secs_f64(p.call_timeout),
            stall_timeout: Duration::from_secs_f64(p.stall_timeout),
            chunk_size: p.chunk_size,
            state_dir: p.state_dir.clone().unwrap_or_else(default_state_dir),
            state_backend: p.state_backend,
            event_url: obs.event_url.clone(),
            event_token_env: obs.event_token_env.clone(),
            event_timeout: Duration::from_secs_f64(obs.event_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(toml: &str) -> Config {
        Config::from_toml_str(toml, Path::new("ferry.toml")).unwrap()
    }

    fn errors(toml: &str) -> Vec<String> {
        match SettingsValidator::new(&parse(toml)).validate() {
            Err(ConfigError::ValidationFailed(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn resolves_durations_and_retry_policy() {
        let config = parse(
            r#"
            [pipeline]
            sleep_between_batches = 0.25
            max_retries = 5
            state_dir = "/var/lib/ferry"
            "#,
        );

        let settings = SettingsValidator::new(&config).validate().unwrap();
        assert_eq!(settings.sleep_between_batches, Duration::from_millis(250));
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay, Duration::from_secs(1));
        assert_eq!(settings.state_dir, Path::new("/var/lib/ferry"));
    }

    #[test]
    fn zero_batch_size_and_retries_are_rejected() {
        let errors = errors("[pipeline]\nbatch_size = 0\nmax_retries = 0\n");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("batch_size"));
        assert!(errors[1].contains("max_retries"));
    }

    #[test]
    fn negative_sleep_is_rejected() {
        let errors = errors("[pipeline]\nsleep_between_batches = -1.0\n");
        assert!(errors[0].contains("sleep_between_batches"));
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        let errors = errors(
            "[pipeline]\nsleep_between_batches = 1e30\ncall_timeout = 1e300\n\n[observability]\nevent_timeout = nan\n",
        );
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("sleep_between_batches"));
        assert!(errors[1].contains("call_timeout"));
        assert!(errors[2].contains("event_timeout"));
    }

    #[test]
    fn duplicate_and_invalid_target_names_are_rejected() {
        let errors = errors(
            r#"
            [[targets]]
            name = "rows"
            source = { kind = "csv", path = "a.csv" }
            sink = { kind = "jsonl", path = "out.jsonl" }

            [[targets]]
            name = "rows"
            source = { kind = "csv", path = "b.csv" }
            sink = { kind = "jsonl", path = "out.jsonl" }

            [[targets]]
            name = "bad/name"
            source = { kind = "csv", path = "c.csv" }
            sink = { kind = "jsonl", path = "out.jsonl" }
            "#,
        );

        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("more than once"));
        assert!(errors[1].contains("bad/name"));
    }

    #[test]
    fn download_sink_requires_stream_and_manifest() {
        let errors = errors(
            r#"
            [[targets]]
            name = "files"
            source = { kind = "csv", path = "a.csv" }
            sink = { kind = "download", dest_dir = "out" }
            "#,
        );

        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn target_batch_size_overrides_pipeline() {
        let config = parse(
            r#"
            [[targets]]
            name = "rows"
            batch_size = 7
            source = { kind = "csv", path = "a.csv" }
            sink = { kind = "jsonl", path = "out.jsonl" }
            "#,
        );

        let settings = SettingsValidator::new(&config).validate().unwrap();
        let target = SettingsValidator::for_target(&settings, &config.targets[0]);
        assert_eq!(target.batch_size, 7);
        assert_eq!(settings.batch_size, 100);
    }
}
