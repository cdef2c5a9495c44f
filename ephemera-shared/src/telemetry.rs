//! Tracing subscriber setup shared by the server and the CLI.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Where formatted log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Used by interactive commands so stdout stays free for the chat view.
    Stderr,
}

/// Installs the global tracing subscriber for the provided configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Returns the level
/// that was requested so callers can log it; a second call is a no-op.
pub fn initialize_tracing(config: &LoggingConfig, target: LogTarget) -> String {
    let env_filter = build_env_filter(&config.level);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = match (config.format, target) {
        (LogFormat::Json, LogTarget::Stdout) => fmt_builder.json().with_ansi(false).try_init(),
        (LogFormat::Json, LogTarget::Stderr) => fmt_builder
            .json()
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .try_init(),
        (LogFormat::Text, LogTarget::Stdout) => fmt_builder.with_ansi(true).try_init(),
        (LogFormat::Text, LogTarget::Stderr) => fmt_builder
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    config.level.clone()
}

fn build_env_filter(level: &str) -> EnvFilter {
    let default_level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}
