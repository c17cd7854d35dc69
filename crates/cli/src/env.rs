use crate::error::CliError;
use std::{collections::HashMap, fs, path::Path};
use tracing::debug;

pub const ENV_FILE: &str = ".env";

/// Process environment layered with an optional `.env` file. Variables
/// already set in the process win over the file.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Loads `.env` from the directory holding `config`, if one exists.
    pub fn load_beside(&mut self, config: &Path) -> Result<(), CliError> {
        let dir = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let path = dir.join(ENV_FILE);
        if path.is_file() {
            self.load_from_file(&path)?;
        }
        Ok(())
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<(), CliError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::EnvFile(format!("{}: {e}", path.display())))?;
        let loaded = self.parse_env_content(&content)?;
        debug!(path = %path.display(), loaded, "Loaded env file");
        Ok(())
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Returns how many variables the file contributed.
    fn parse_env_content(&mut self, content: &str) -> Result<usize, CliError> {
        let mut loaded = 0;
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::EnvFile(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::EnvFile(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }

            if !self.vars.contains_key(key) {
                self.vars.insert(key.to_string(), unquote(value.trim()));
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
