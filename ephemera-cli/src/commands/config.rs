use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use shared::config::{client::ClientConfig, server::ServerConfig};

/// Which configuration file to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKind {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    const fn default_file_name(self) -> &'static str {
        match self {
            Self::Yaml => "config.yaml",
            Self::Json => "config.json",
        }
    }
}

fn serialize<T: Serialize>(value: &T, format: ConfigFormat) -> Result<String> {
    Ok(match format {
        ConfigFormat::Yaml => serde_yml::to_string(value)?,
        ConfigFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

/// Renders the default configuration of `kind` in `format`.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render_defaults(kind: ConfigKind, format: ConfigFormat) -> Result<String> {
    match kind {
        ConfigKind::Server => serialize(&ServerConfig::default(), format),
        ConfigKind::Client => serialize(&ClientConfig::default(), format),
    }
}

/// Writes a configuration file with default values and returns its path.
///
/// # Errors
/// Returns an error if serialization or writing the file fails.
pub fn generate_config(
    kind: ConfigKind,
    format: ConfigFormat,
    output: Option<PathBuf>,
) -> Result<PathBuf> {
    let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
    let serialized = render_defaults(kind, format)?;
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
