#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Main entry point for the Ephemera CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use server::StorageBackend;
use shared::config::{default_config_path, server::ServerConfig};
use std::path::PathBuf;

mod commands;

use commands::{
    chat::ChatArgs,
    cleanup::CleanupArgs,
    config::{ConfigFormat, ConfigKind},
};

/// Ephemera CLI
#[derive(Parser)]
#[command(name = "ephemera")]
#[command(about = "Ephemeral chat: messages vanish 24 hours after they are sent", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the message server
    Serve {
        /// Port to bind; overrides the configuration file and environment
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to a YAML or JSON configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Keep rows in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Join the chat room from the terminal
    Chat(ChatArgs),
    /// Run one cleanup pass against the server and exit
    Cleanup(CleanupArgs),
    /// Generate a configuration file with default values
    Config {
        /// Which configuration to generate
        #[arg(long, short, value_enum, default_value_t = ConfigKind::Client)]
        kind: ConfigKind,

        /// Output format
        #[arg(long, short, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,

        /// Destination file; defaults to `config.yaml` or `config.json` in the current directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completion {
        /// Target shell
        #[arg(long, short, value_enum)]
        shell: Shell,
    },
}

/// An explicit path wins; otherwise the platform config file is used if it exists.
pub(crate) fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| default_config_path().filter(|path| path.exists()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            config,
            in_memory,
        } => {
            let config = ServerConfig::load_config(resolve_config_path(config), port)
                .context("failed to load server configuration")?;
            let backend = if in_memory {
                StorageBackend::InMemory
            } else {
                StorageBackend::Postgres
            };
            server::run(config, backend).await?;
        }
        Commands::Chat(args) => commands::chat::run(args).await?,
        Commands::Cleanup(args) => commands::cleanup::run(args).await?,
        Commands::Config {
            kind,
            format,
            output,
        } => {
            let path = commands::config::generate_config(kind, format, output)?;
            println!("Configuration file '{}' generated successfully.", path.display());
        }
        Commands::Completion { shell } => commands::completion::generate_completion(shell),
    }

    Ok(())
}
