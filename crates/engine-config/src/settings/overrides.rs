use crate::{error::ConfigError, settings::PipelineConfig};
use std::{collections::HashMap, path::PathBuf, str::FromStr};
use tracing::info;

pub const BATCH_SIZE: &str = "FERRY_BATCH_SIZE";
pub const SLEEP_BETWEEN_BATCHES: &str = "FERRY_SLEEP_BETWEEN_BATCHES";
pub const MAX_RETRIES: &str = "FERRY_MAX_RETRIES";
pub const FETCH_SIZE: &str = "FERRY_FETCH_SIZE";
pub const RESUME: &str = "FERRY_RESUME";
pub const STATE_DIR: &str = "FERRY_STATE_DIR";

/// Applies `FERRY_*` variables on top of the `[pipeline]` table and returns
/// the names of the variables that were used.
pub fn apply_env_overrides(
    pipeline: &mut PipelineConfig,
    vars: &HashMap<String, String>,
) -> Result<Vec<&'static str>, ConfigError> {
    let mut applied = Vec::new();

    if let Some(v) = parse_var(vars, BATCH_SIZE)? {
        pipeline.batch_size = v;
        applied.push(BATCH_SIZE);
    }
    if let Some(v) = parse_var(vars, SLEEP_BETWEEN_BATCHES)? {
        pipeline.sleep_between_batches = v;
        applied.push(SLEEP_BETWEEN_BATCHES);
    }
    if let Some(v) = parse_var(vars, MAX_RETRIES)? {
        pipeline.max_retries = v;
        applied.push(MAX_RETRIES);
    }
    if let Some(v) = parse_var(vars, FETCH_SIZE)? {
        pipeline.fetch_size = v;
        applied.push(FETCH_SIZE);
    }
    if let Some(raw) = lookup(vars, RESUME) {
        pipeline.resume = parse_bool(RESUME, raw)?;
        applied.push(RESUME);
    }
    if let Some(raw) = lookup(vars, STATE_DIR) {
        pipeline.state_dir = Some(PathBuf::from(raw));
        applied.push(STATE_DIR);
    }

    if !applied.is_empty() {
        info!(overrides = ?applied, "Applied environment overrides");
    }
    Ok(applied)
}

fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(vars, name) else {
        return Ok(None);
    };

    raw.parse::<T>().map(Some).map_err(|e| ConfigError::Env {
        var: name.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var: name.to_string(),
            value: raw.to_string(),
            reason: "expected true/false, yes/no, on/off or 1/0".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut pipeline = PipelineConfig::default();
        let applied = apply_env_overrides(
            &mut pipeline,
            &vars(&[
                ("FERRY_BATCH_SIZE", "25"),
                ("FERRY_SLEEP_BETWEEN_BATCHES", "0.5"),
                ("FERRY_RESUME", "yes"),
                ("FERRY_STATE_DIR", "/tmp/ferry"),
                ("UNRELATED", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(pipeline.batch_size, 25);
        assert_eq!(pipeline.sleep_between_batches, 0.5);
        assert!(pipeline.resume);
        assert_eq!(pipeline.state_dir, Some(PathBuf::from("/tmp/ferry")));
        assert_eq!(applied.len(), 4);
    }

    #[test]
    fn blank_values_are_ignored() {
        let mut pipeline = PipelineConfig::default();
        let applied =
            apply_env_overrides(&mut pipeline, &vars(&[("FERRY_MAX_RETRIES", "  ")])).unwrap();

        assert!(applied.is_empty());
        assert_eq!(pipeline.max_retries, 3);
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let mut pipeline = PipelineConfig::default();
        let err = apply_env_overrides(&mut pipeline, &vars(&[("FERRY_FETCH_SIZE", "lots")]))
            .unwrap_err();

        assert!(matches!(&err, ConfigError::Env { var, .. } if var == "FERRY_FETCH_SIZE"));
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let mut pipeline = PipelineConfig::default();
        assert!(apply_env_overrides(&mut pipeline, &vars(&[("FERRY_RESUME", "maybe")])).is_err());
    }
}
