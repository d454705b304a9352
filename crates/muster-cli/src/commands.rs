//! Subcommand execution.
//!
//! Each run opens one gateway session, waits for `READY`, runs a single
//! query and prints the result as JSON on stdout.

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Subcommand;
use muster_core::{
    Correlate, CorrelationKey, EventBus, GatewayClient, Outbox, QueryOptions, Step,
};
use muster_protocol::{GatewayEvent, Identify, Ready, Snowflake};
use muster_transport::{GatewaySession, WebSocketConfig, WebSocketConnection};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List guilds available to the account.
    Guilds,

    /// Fetch all members of a guild.
    GuildMembers {
        /// Guild id.
        guild_id: Snowflake,

        /// Maximum members to fetch, 0 for all.
        #[arg(long, default_value_t = 0)]
        limit: u32,
    },

    /// Fetch the member list of a guild channel.
    ChannelMembers {
        /// Guild id.
        guild_id: Snowflake,

        /// Channel id.
        channel_id: Snowflake,

        /// First list position to fetch.
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Maximum members to return, 0 for all.
        #[arg(long, default_value_t = 0)]
        count: usize,
    },
}

/// Resolves on the session's `READY` event.
struct ReadyQuery;

impl Correlate for ReadyQuery {
    type Output = Ready;

    fn key(&self) -> CorrelationKey {
        CorrelationKey::Session
    }

    fn kind(&self) -> &'static str {
        "ready"
    }

    fn matches(&self, event: &GatewayEvent) -> bool {
        matches!(event, GatewayEvent::Ready(_))
    }

    // Identify is sent by the session itself.
    fn start(&mut self, _outbox: &mut Outbox) {}

    fn on_event(&mut self, event: &GatewayEvent, _outbox: &mut Outbox) -> Step<Ready> {
        match event {
            GatewayEvent::Ready(ready) => Step::Done(ready.clone()),
            _ => Step::Pending,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{output}");
    Ok(())
}

/// Run a subcommand against the configured gateway.
///
/// # Errors
///
/// Returns an error if the connection fails, the session never becomes
/// ready, or the query fails.
pub async fn run(command: Command, config: Config) -> Result<()> {
    let token = config.token()?.to_string();

    let connection = WebSocketConnection::connect(
        &config.gateway_url,
        WebSocketConfig {
            encoding: config.encoding,
            api_version: config.api_version,
            ..WebSocketConfig::default()
        },
    )
    .await
    .with_context(|| format!("Failed to connect to {}", config.gateway_url))?;

    let bus = EventBus::new();
    let client_config = config.client.to_client_config();
    let timeout = client_config.query_timeout;

    let (session, commands) = GatewaySession::new(bus.clone(), Identify::new(token));
    let client = GatewayClient::new(bus, Arc::new(commands), client_config);

    // Listen for READY before the session can deliver it.
    let ready = client.correlator().begin(ReadyQuery);
    let session = tokio::spawn(session.run(connection));

    let ready = ready
        .wait(timeout)
        .await
        .context("Gateway session did not become ready")?;
    info!(session = %ready.session_id, guilds = ready.guilds.len(), "Session ready");

    let result = execute(&client, command).await;

    debug!("Closing gateway session");
    session.abort();
    result
}

async fn execute(client: &GatewayClient, command: Command) -> Result<()> {
    match command {
        Command::Guilds => {
            let guilds = client.cached_guilds()?;
            print_json(&guilds)
        }
        Command::GuildMembers { guild_id, limit } => {
            let members = client
                .fetch_guild_members(guild_id, limit)
                .await
                .with_context(|| format!("Failed to fetch members of guild {guild_id}"))?;
            info!(guild = %guild_id, members = members.len(), "Fetched guild members");
            print_json(&members)
        }
        Command::ChannelMembers {
            guild_id,
            channel_id,
            offset,
            count,
        } => {
            let options = QueryOptions::new().with_offset(offset).with_count(count);
            let members = client
                .fetch_channel_members(guild_id, channel_id, options)
                .await
                .with_context(|| {
                    format!("Failed to fetch member list of channel {channel_id}")
                })?;
            info!(guild = %guild_id, channel = %channel_id, members = members.len(), "Fetched channel members");
            print_json(&members)
        }
    }
}
