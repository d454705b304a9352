//! # Muster CLI
//!
//! Query guild members over a gateway connection.
//!
//! ## Usage
//!
//! ```bash
//! # List guilds
//! MUSTER_TOKEN=... muster guilds
//!
//! # Fetch all members of a guild
//! muster guild-members 81384788765712384
//!
//! # Fetch the first 50 entries of a channel member list
//! muster channel-members 81384788765712384 81384788765712385 --count 50
//!
//! # Run with custom config
//! muster --config /path/to/muster.toml guilds
//! ```

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "muster", version, about)]
struct Cli {
    /// Path to a config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Account token, overriding the config file.
    #[arg(long, env = "MUSTER_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.token.is_some() {
        config.token = cli.token;
    }

    tracing::debug!(gateway = %config.gateway_url, encoding = config.encoding.as_str(), "Configuration loaded");

    muster_core::metrics::describe();

    commands::run(cli.command, config).await
}
