#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Standalone entry point for the Ephemera server.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use server::{StorageBackend, server::run};
use shared::config::server::ServerConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ephemera-server")]
#[command(about = "Message store and change feed for Ephemera", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            config,
            in_memory,
        } => {
            let config = ServerConfig::load_config(config, port)?;
            let backend = if in_memory {
                StorageBackend::InMemory
            } else {
                StorageBackend::Postgres
            };
            run(config, backend).await
        }
    }
}
