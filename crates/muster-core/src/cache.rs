//! In-memory guild cache maintained from gateway events.

use crate::metrics;
use dashmap::DashMap;
use muster_protocol::{GatewayEvent, Guild, Snowflake};
use tracing::debug;

/// Guilds known to the current session.
#[derive(Debug, Default)]
pub struct GuildCache {
    guilds: DashMap<Snowflake, Guild>,
}

impl GuildCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the cache from an event. Unrelated events are ignored.
    pub fn apply(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Ready(ready) => {
                self.guilds.clear();
                for guild in &ready.guilds {
                    self.guilds.insert(guild.id, guild.clone());
                }
                debug!(guilds = ready.guilds.len(), "Guild cache seeded");
            }
            GatewayEvent::GuildCreate(guild) => {
                self.upsert(guild);
            }
            GatewayEvent::GuildDelete(guild) => {
                // An unavailable guild is an outage, not a removal.
                if guild.unavailable {
                    self.upsert(guild);
                } else if self.guilds.remove(&guild.id).is_some() {
                    debug!(guild = %guild.id, "Guild removed from cache");
                }
            }
            _ => return,
        }

        metrics::set_cached_guilds(self.guilds.len());
    }

    fn upsert(&self, guild: &Guild) {
        match self.guilds.get_mut(&guild.id) {
            Some(mut cached) => {
                let merged = Guild {
                    id: guild.id,
                    name: guild.name.clone().or_else(|| cached.name.take()),
                    member_count: guild.member_count.or(cached.member_count),
                    unavailable: guild.unavailable,
                };
                *cached = merged;
            }
            None => {
                self.guilds.insert(guild.id, guild.clone());
            }
        }
    }

    /// Get a guild.
    #[must_use]
    pub fn get(&self, guild_id: Snowflake) -> Option<Guild> {
        self.guilds.get(&guild_id).map(|guild| guild.value().clone())
    }

    /// Check whether a guild is cached.
    #[must_use]
    pub fn contains(&self, guild_id: Snowflake) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    /// All cached guilds, ordered by id.
    #[must_use]
    pub fn all(&self) -> Vec<Guild> {
        let mut guilds: Vec<Guild> = self
            .guilds
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        guilds.sort_by_key(|guild| guild.id);
        guilds
    }

    /// Number of cached guilds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_protocol::Ready;

    fn guild(id: u64, name: Option<&str>) -> Guild {
        Guild {
            id: Snowflake(id),
            name: name.map(str::to_string),
            member_count: None,
            unavailable: false,
        }
    }

    #[test]
    fn test_ready_seeds_cache() {
        let cache = GuildCache::new();
        cache.apply(&GatewayEvent::GuildCreate(guild(9, Some("stale"))));

        cache.apply(&GatewayEvent::Ready(Ready {
            session_id: "abc".to_string(),
            user: None,
            guilds: vec![guild(2, None), guild(1, None)],
        }));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(Snowflake(9)));
        let ids: Vec<u64> = cache.all().iter().map(|g| g.id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_guild_create_fills_in_details() {
        let cache = GuildCache::new();
        cache.apply(&GatewayEvent::GuildCreate(guild(1, None)));
        cache.apply(&GatewayEvent::GuildCreate(Guild {
            member_count: Some(250),
            ..guild(1, Some("lobby"))
        }));

        let cached = cache.get(Snowflake(1)).unwrap();
        assert_eq!(cached.name.as_deref(), Some("lobby"));
        assert_eq!(cached.member_count, Some(250));
    }

    #[test]
    fn test_guild_delete() {
        let cache = GuildCache::new();
        cache.apply(&GatewayEvent::GuildCreate(guild(1, Some("lobby"))));
        cache.apply(&GatewayEvent::GuildCreate(guild(2, Some("other"))));

        // Outage keeps the guild, marked unavailable.
        cache.apply(&GatewayEvent::GuildDelete(Guild {
            unavailable: true,
            ..guild(1, None)
        }));
        let cached = cache.get(Snowflake(1)).unwrap();
        assert!(cached.unavailable);
        assert_eq!(cached.name.as_deref(), Some("lobby"));

        cache.apply(&GatewayEvent::GuildDelete(guild(2, None)));
        assert!(cache.get(Snowflake(2)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ignores_other_events() {
        let cache = GuildCache::new();
        cache.apply(&GatewayEvent::HeartbeatAck);
        assert!(cache.is_empty());
    }
}
