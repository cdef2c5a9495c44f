//! # Configuration
//!
//! Server and client configuration share the same loading rules: an optional
//! YAML or JSON file, then `EPHEMERA_*` environment variables for values still
//! at their defaults, then command-line overrides.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported configuration format '{0}'. Use 'yaml' or 'json'.")]
    UnsupportedFormat(String),
    #[error("Invalid {var} value '{value}'")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging settings shared by every binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    pub(crate) fn apply_env(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::default();
        if self.level == defaults.level
            && let Some(level) = env_var("EPHEMERA_LOG_LEVEL")
        {
            self.level = level;
        }
        if self.format == defaults.format
            && let Some(format) = env_parse("EPHEMERA_LOG_FORMAT")?
        {
            self.format = format;
        }
        Ok(())
    }

    pub(crate) fn validate(&self, errors: &mut Vec<String>) {
        if self.level.trim().is_empty() {
            errors.push("Logging level must not be empty.".to_string());
        }
    }
}

/// Platform configuration file used when no explicit path is given.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "ephemera", "ephemera")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Parses a configuration file, choosing the format from its extension.
pub(crate) fn read_config_file<T: DeserializeOwned + 'static>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => Ok(serde_yml::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or_default().to_string(),
        )),
    }
}

pub(crate) fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var: name, value }),
        None => Ok(None),
    }
}
