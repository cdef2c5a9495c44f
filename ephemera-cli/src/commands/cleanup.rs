//! One-shot remote cleanup, suitable for cron.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Args;
use client::{CleanupReport, CleanupService, HttpRemoteStore, SystemClock};
use shared::{
    config::client::ClientConfig,
    telemetry::{LogTarget, initialize_tracing},
};
use url::Url;

use crate::resolve_config_path;

#[derive(Args, Debug)]
#[command(about = "Delete expired messages and inactive users once")]
pub struct CleanupArgs {
    /// Ephemera server base URL (default: <http://localhost:8080>)
    #[arg(long, short)]
    pub server: Option<Url>,

    /// Path to a YAML or JSON client configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

fn describe(step: Option<u64>) -> String {
    step.map_or_else(|| "failed".to_string(), |count| count.to_string())
}

/// Summary printed after a pass.
#[must_use]
pub fn summarize(report: &CleanupReport) -> String {
    format!(
        "expired messages deleted: {}\ninactive users deleted: {}",
        describe(report.messages_deleted),
        describe(report.users_deleted)
    )
}

/// Runs a single cleanup pass.
///
/// # Errors
/// Returns an error if configuration cannot be loaded or either step failed.
pub async fn run(args: CleanupArgs) -> Result<()> {
    let config = ClientConfig::load_config(resolve_config_path(args.config), args.server)
        .context("failed to load client configuration")?;
    initialize_tracing(&config.logging, LogTarget::Stderr);

    let remote = Arc::new(HttpRemoteStore::new(&config.server_url)?);
    let service = CleanupService::new(remote, Arc::new(SystemClock), config.cleanup.clone());
    let report = service.trigger().await;

    println!("{}", summarize(&report));
    if report.messages_deleted.is_none() || report.users_deleted.is_none() {
        bail!("cleanup against {} did not complete", config.server_url);
    }
    Ok(())
}
