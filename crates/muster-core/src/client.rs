//! Gateway client: the public query surface.

use crate::assembly::QueryOptions;
use crate::bus::{EventBus, Subscription};
use crate::cache::GuildCache;
use crate::correlator::{Correlator, QueryError, QueryHandle};
use crate::members::{ChannelMembersQuery, GuildMembersQuery};
use crate::planner::{RangePlanner, DEFAULT_RANGES_PER_REQUEST};
use crate::sender::RequestSender;
use muster_protocol::{GatewayEvent, Guild, GuildMember, Snowflake};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The guild is not in the cache.
    #[error("Guild {0} was not found in the cache")]
    NotFound(Snowflake),

    /// The operation needs the cache, which is disabled.
    #[error("{0} requires caching, which is disabled for this client")]
    Unsupported(&'static str),

    /// A blocking call was made without a runtime to drive it.
    #[error("No tokio runtime available for a blocking call")]
    NoRuntime,

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Maintain a guild cache and check guild ids against it.
    pub cache: bool,
    /// Deadline applied to every fetch.
    pub query_timeout: Duration,
    /// Windows sent per member list request.
    pub ranges_per_request: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache: true,
            query_timeout: Duration::from_secs(30),
            ranges_per_request: DEFAULT_RANGES_PER_REQUEST,
        }
    }
}

/// Issues member queries over a gateway session.
pub struct GatewayClient {
    config: ClientConfig,
    correlator: Arc<Correlator>,
    cache: Arc<GuildCache>,
    runtime: Option<Handle>,
    _subscriptions: Vec<Subscription>,
}

impl GatewayClient {
    /// Create a client on top of a bus and a request sender.
    ///
    /// Picks up the current tokio runtime, if any, for blocking calls.
    #[must_use]
    pub fn new(bus: EventBus, sender: Arc<dyn RequestSender>, config: ClientConfig) -> Self {
        let correlator = Arc::new(Correlator::new(bus.clone(), sender));
        let cache = Arc::new(GuildCache::new());
        let mut subscriptions = Vec::with_capacity(2);

        if config.cache {
            let cache = Arc::clone(&cache);
            subscriptions.push(bus.subscribe(move |event| cache.apply(event)));
        }

        let supervisor = Arc::downgrade(&correlator);
        subscriptions.push(bus.subscribe(move |event| {
            if !matches!(event, GatewayEvent::Disconnected) {
                return;
            }
            if let Some(correlator) = supervisor.upgrade() {
                let aborted = correlator.abort_all(QueryError::Disconnected);
                info!(aborted, "Gateway disconnected");
            }
        }));

        debug!(?config, "Gateway client created");

        Self {
            config,
            correlator,
            cache,
            runtime: Handle::try_current().ok(),
            _subscriptions: subscriptions,
        }
    }

    /// Use `handle` to drive blocking calls.
    #[must_use]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the correlator, for supervision.
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Get the event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        self.correlator.bus()
    }

    /// All cached guilds.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if caching is disabled.
    pub fn cached_guilds(&self) -> Result<Vec<Guild>, ClientError> {
        if !self.config.cache {
            return Err(ClientError::Unsupported("Guild cache access"));
        }
        Ok(self.cache.all())
    }

    /// One cached guild.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if caching is disabled, `NotFound` if the guild
    /// is not cached.
    pub fn cached_guild(&self, guild_id: Snowflake) -> Result<Guild, ClientError> {
        if !self.config.cache {
            return Err(ClientError::Unsupported("Guild cache access"));
        }
        self.cache
            .get(guild_id)
            .ok_or(ClientError::NotFound(guild_id))
    }

    fn ensure_known(&self, guild_id: Snowflake) -> Result<(), ClientError> {
        if self.config.cache && !self.cache.contains(guild_id) {
            return Err(ClientError::NotFound(guild_id));
        }
        Ok(())
    }

    /// Start fetching guild members without waiting.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if caching is enabled and the guild is not cached.
    /// Nothing is sent in that case.
    pub fn begin_guild_members(
        &self,
        guild_id: Snowflake,
        limit: u32,
    ) -> Result<QueryHandle<Vec<GuildMember>>, ClientError> {
        self.ensure_known(guild_id)?;
        Ok(self
            .correlator
            .begin(GuildMembersQuery::new(guild_id, limit)))
    }

    /// Start fetching a channel member list without waiting.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if caching is enabled and the guild is not cached.
    pub fn begin_channel_members(
        &self,
        guild_id: Snowflake,
        channel_id: Snowflake,
        options: QueryOptions,
    ) -> Result<QueryHandle<Vec<GuildMember>>, ClientError> {
        self.ensure_known(guild_id)?;
        let planner = RangePlanner::new(self.config.ranges_per_request);
        Ok(self.correlator.begin(ChannelMembersQuery::new(
            guild_id, channel_id, options, planner,
        )))
    }

    /// Fetch guild members; `limit` of `0` fetches all of them.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` before sending anything for an unknown guild, or
    /// the query's failure (`Timeout` after the configured deadline).
    pub async fn fetch_guild_members(
        &self,
        guild_id: Snowflake,
        limit: u32,
    ) -> Result<Vec<GuildMember>, ClientError> {
        let handle = self.begin_guild_members(guild_id, limit)?;
        Ok(handle.wait(self.config.query_timeout).await?)
    }

    /// Fetch a channel member list.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayClient::fetch_guild_members`].
    pub async fn fetch_channel_members(
        &self,
        guild_id: Snowflake,
        channel_id: Snowflake,
        options: QueryOptions,
    ) -> Result<Vec<GuildMember>, ClientError> {
        let handle = self.begin_channel_members(guild_id, channel_id, options)?;
        Ok(handle.wait(self.config.query_timeout).await?)
    }

    /// Blocking [`GatewayClient::fetch_guild_members`].
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` if the client has no runtime handle.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async context.
    pub fn fetch_guild_members_blocking(
        &self,
        guild_id: Snowflake,
        limit: u32,
    ) -> Result<Vec<GuildMember>, ClientError> {
        let runtime = self.runtime.as_ref().ok_or(ClientError::NoRuntime)?;
        runtime.block_on(self.fetch_guild_members(guild_id, limit))
    }

    /// Blocking [`GatewayClient::fetch_channel_members`].
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` if the client has no runtime handle.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async context.
    pub fn fetch_channel_members_blocking(
        &self,
        guild_id: Snowflake,
        channel_id: Snowflake,
        options: QueryOptions,
    ) -> Result<Vec<GuildMember>, ClientError> {
        let runtime = self.runtime.as_ref().ok_or(ClientError::NoRuntime)?;
        runtime.block_on(self.fetch_channel_members(guild_id, channel_id, options))
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .field("correlator", &self.correlator)
            .field("cached_guilds", &self.cache.len())
            .finish()
    }
}
