//! Member queries.
//!
//! Two query shapes are supported:
//!
//! - [`GuildMembersQuery`]: one request, answered by `GUILD_MEMBERS_CHUNK`
//!   events numbered `0..chunk_count`.
//! - [`ChannelMembersQuery`]: ranged member list requests, answered by
//!   `GUILD_MEMBER_LIST_UPDATE` events whose `SYNC` operations carry one
//!   window each. Follow-up windows are requested until the list is
//!   exhausted or the caller's cap is reached.

use crate::assembly::{Fragment, QueryOptions, ResultAccumulator};
use crate::correlator::{Correlate, CorrelationKey, Outbox, Step};
use crate::metrics;
use crate::planner::RangePlanner;
use muster_protocol::{
    Command, GatewayEvent, GuildMember, GuildMemberListUpdate, GuildMemberQuery,
    GuildMembersChunk, MemberListOperation, MemberListQuery, RangeWindow, Snowflake,
};
use tracing::debug;

fn stamp(mut members: Vec<GuildMember>, guild_id: Snowflake) -> Vec<GuildMember> {
    for member in &mut members {
        member.guild_id = Some(guild_id);
    }
    members
}

/// Fetch every member of a guild through chunked responses.
#[derive(Debug)]
pub struct GuildMembersQuery {
    guild_id: Snowflake,
    limit: u32,
    chunks: ResultAccumulator<Vec<GuildMember>>,
}

impl GuildMembersQuery {
    /// Create a query; `limit` of `0` asks for all members.
    #[must_use]
    pub fn new(guild_id: Snowflake, limit: u32) -> Self {
        Self {
            guild_id,
            limit,
            chunks: ResultAccumulator::new(),
        }
    }

    fn on_chunk(&mut self, chunk: &GuildMembersChunk) -> Step<Vec<GuildMember>> {
        self.chunks
            .merge(Fragment::new(chunk.chunk_index, vec![chunk.members.clone()]));

        debug!(
            guild = %self.guild_id,
            index = chunk.chunk_index,
            count = chunk.chunk_count,
            members = chunk.members.len(),
            "Merged member chunk"
        );

        // Chunks can arrive in any order; only a full set completes.
        if self.chunks.len() < chunk.chunk_count as usize {
            return Step::Pending;
        }

        let chunks = std::mem::take(&mut self.chunks);
        let members = chunks
            .finalize(&QueryOptions::new())
            .into_iter()
            .flatten()
            .collect();
        Step::Done(stamp(members, self.guild_id))
    }
}

impl Correlate for GuildMembersQuery {
    type Output = Vec<GuildMember>;

    fn key(&self) -> CorrelationKey {
        CorrelationKey::Guild(self.guild_id)
    }

    fn kind(&self) -> &'static str {
        "guild_members"
    }

    fn matches(&self, event: &GatewayEvent) -> bool {
        matches!(event, GatewayEvent::GuildMembersChunk(chunk) if chunk.guild_id == self.guild_id)
    }

    fn start(&mut self, outbox: &mut Outbox) {
        outbox.push(Command::RequestGuildMembers(GuildMemberQuery::new(
            self.guild_id,
            self.limit,
        )));
    }

    fn on_event(&mut self, event: &GatewayEvent, _outbox: &mut Outbox) -> Step<Self::Output> {
        match event {
            GatewayEvent::GuildMembersChunk(chunk) => self.on_chunk(chunk),
            _ => Step::Pending,
        }
    }
}

/// Fetch the member list of a guild channel in windows.
#[derive(Debug)]
pub struct ChannelMembersQuery {
    guild_id: Snowflake,
    channel_id: Snowflake,
    options: QueryOptions,
    planner: RangePlanner,
    members: ResultAccumulator<GuildMember>,
    outstanding: usize,
    last_followup: Option<u32>,
}

impl ChannelMembersQuery {
    /// Create a query.
    #[must_use]
    pub fn new(
        guild_id: Snowflake,
        channel_id: Snowflake,
        options: QueryOptions,
        planner: RangePlanner,
    ) -> Self {
        Self {
            guild_id,
            channel_id,
            options,
            planner,
            members: ResultAccumulator::new(),
            outstanding: 0,
            last_followup: None,
        }
    }

    /// Number of requested windows not yet answered.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Number of distinct positions merged.
    #[must_use]
    pub fn merged(&self) -> usize {
        self.members.len()
    }

    fn request(&mut self, windows: Vec<RangeWindow>, outbox: &mut Outbox) {
        if windows.is_empty() {
            return;
        }
        self.outstanding += windows.len();
        outbox.push(Command::GuildSubscriptions(MemberListQuery::new(
            self.guild_id,
            self.channel_id,
            windows,
        )));
    }

    fn on_update(&mut self, update: &GuildMemberListUpdate, outbox: &mut Outbox) -> Step<Vec<GuildMember>> {
        let mut synced = false;

        for op in &update.ops {
            let MemberListOperation::Sync { range, items } = op else {
                continue;
            };
            synced = true;
            // An answered window counts even if it carried nothing.
            self.outstanding = self.outstanding.saturating_sub(1);

            let Some(range) = range else {
                debug!(guild = %self.guild_id, "Skipping SYNC without range");
                continue;
            };
            let members: Vec<GuildMember> = items
                .iter()
                .filter_map(|item| item.member.clone())
                .collect();
            self.members.merge(Fragment::new(range.start, members));
        }

        if !synced {
            return Step::Pending;
        }

        let combined = update.combined_count();
        if self.members.is_complete(combined, &self.options) {
            let members = std::mem::take(&mut self.members).finalize(&self.options);
            return Step::Done(stamp(members, self.guild_id));
        }

        let highest = self.members.highest_index();
        if self.planner.needs_followup(
            self.members.len(),
            &self.options,
            combined,
            highest,
            self.outstanding,
        ) {
            if let Some(highest) = highest {
                let windows = self.planner.plan_followup(highest);
                let start = windows.first().map(|window| window.start);
                // An empty answer leaves `highest` unchanged; asking again
                // would repeat the same windows.
                if start == self.last_followup {
                    debug!(
                        guild = %self.guild_id,
                        channel = %self.channel_id,
                        merged = self.members.len(),
                        combined,
                        "Follow-up answered without members, not repeating"
                    );
                    return Step::Pending;
                }
                self.last_followup = start;
                debug!(
                    guild = %self.guild_id,
                    channel = %self.channel_id,
                    merged = self.members.len(),
                    combined,
                    ?windows,
                    "Requesting more of the member list"
                );
                metrics::record_followup();
                self.request(windows, outbox);
            }
        }

        Step::Pending
    }
}

impl Correlate for ChannelMembersQuery {
    type Output = Vec<GuildMember>;

    fn key(&self) -> CorrelationKey {
        CorrelationKey::Channel {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
        }
    }

    fn kind(&self) -> &'static str {
        "channel_members"
    }

    // List updates are keyed by guild only.
    fn matches(&self, event: &GatewayEvent) -> bool {
        matches!(event, GatewayEvent::GuildMemberListUpdate(update) if update.guild_id == self.guild_id)
    }

    fn start(&mut self, outbox: &mut Outbox) {
        let windows = self.planner.plan_initial(self.options.offset);
        self.request(windows, outbox);
    }

    fn on_event(&mut self, event: &GatewayEvent, outbox: &mut Outbox) -> Step<Self::Output> {
        match event {
            GatewayEvent::GuildMemberListUpdate(update) => self.on_update(update, outbox),
            _ => Step::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_protocol::{MemberListGroup, MemberListItem, User};

    fn member(id: u64) -> GuildMember {
        GuildMember {
            user: User {
                id: Snowflake(id),
                username: format!("user{id}"),
                discriminator: None,
                global_name: None,
                bot: false,
            },
            nick: None,
            roles: vec![],
            joined_at: None,
            guild_id: None,
        }
    }

    fn sync(guild: u64, total: u32, start: u32, len: u32) -> GatewayEvent {
        let mut items = vec![MemberListItem::group(MemberListGroup {
            id: "online".to_string(),
            count: total,
        })];
        items.extend((start..start + len).map(|i| MemberListItem::member(member(u64::from(i)))));

        GatewayEvent::GuildMemberListUpdate(GuildMemberListUpdate {
            guild_id: Snowflake(guild),
            id: Some("everyone".to_string()),
            member_count: total,
            online_count: total,
            groups: vec![MemberListGroup {
                id: "online".to_string(),
                count: total,
            }],
            ops: vec![MemberListOperation::Sync {
                range: Some(RangeWindow::new(start, start + 99)),
                items,
            }],
        })
    }

    fn windows(outbox: &Outbox) -> Vec<Vec<RangeWindow>> {
        outbox
            .commands()
            .iter()
            .map(|command| match command {
                Command::GuildSubscriptions(query) => {
                    query.channels.values().flatten().copied().collect()
                }
                other => panic!("unexpected command {other:?}"),
            })
            .collect()
    }

    fn channel_query(options: QueryOptions) -> ChannelMembersQuery {
        ChannelMembersQuery::new(Snowflake(1), Snowflake(2), options, RangePlanner::default())
    }

    fn ids(members: &[GuildMember]) -> Vec<u64> {
        members.iter().map(|m| m.user.id.get()).collect()
    }

    #[test]
    fn test_guild_members_single_chunk() {
        let mut query = GuildMembersQuery::new(Snowflake(9), 0);
        let mut outbox = Outbox::new();
        query.start(&mut outbox);

        assert_eq!(
            outbox.commands(),
            &[Command::RequestGuildMembers(GuildMemberQuery::new(Snowflake(9), 0))]
        );

        let event = GatewayEvent::GuildMembersChunk(GuildMembersChunk {
            guild_id: Snowflake(9),
            members: (0..250).map(member).collect(),
            chunk_index: 0,
            chunk_count: 1,
        });
        assert!(query.matches(&event));

        let Step::Done(members) = query.on_event(&event, &mut Outbox::new()) else {
            panic!("expected completion");
        };
        assert_eq!(ids(&members), (0..250).collect::<Vec<_>>());
        assert!(members.iter().all(|m| m.guild_id == Some(Snowflake(9))));
    }

    #[test]
    fn test_guild_members_out_of_order_chunks() {
        let mut query = GuildMembersQuery::new(Snowflake(9), 0);
        let chunk = |index: u32| {
            GatewayEvent::GuildMembersChunk(GuildMembersChunk {
                guild_id: Snowflake(9),
                members: vec![member(u64::from(index))],
                chunk_index: index,
                chunk_count: 3,
            })
        };

        let mut outbox = Outbox::new();
        assert_eq!(query.on_event(&chunk(1), &mut outbox), Step::Pending);
        assert_eq!(query.on_event(&chunk(0), &mut outbox), Step::Pending);
        let Step::Done(members) = query.on_event(&chunk(2), &mut outbox) else {
            panic!("expected completion");
        };
        assert_eq!(ids(&members), vec![0, 1, 2]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_guild_members_last_chunk_first() {
        let mut query = GuildMembersQuery::new(Snowflake(9), 0);
        let chunk = |index: u32| {
            GatewayEvent::GuildMembersChunk(GuildMembersChunk {
                guild_id: Snowflake(9),
                members: vec![member(u64::from(index))],
                chunk_index: index,
                chunk_count: 3,
            })
        };

        let mut outbox = Outbox::new();
        assert_eq!(query.on_event(&chunk(2), &mut outbox), Step::Pending);
        assert_eq!(query.on_event(&chunk(0), &mut outbox), Step::Pending);
        let Step::Done(members) = query.on_event(&chunk(1), &mut outbox) else {
            panic!("expected completion");
        };
        assert_eq!(ids(&members), vec![0, 1, 2]);
    }

    #[test]
    fn test_channel_members_empty_followup_not_repeated() {
        let mut query = channel_query(QueryOptions::new());
        query.start(&mut Outbox::new());

        let mut outbox = Outbox::new();
        assert_eq!(query.on_event(&sync(1, 350, 0, 100), &mut outbox), Step::Pending);
        assert_eq!(windows(&outbox), vec![vec![RangeWindow::new(100, 199)]]);

        let mut repeated = 0;
        for _ in 0..50 {
            let mut outbox = Outbox::new();
            assert_eq!(query.on_event(&sync(1, 350, 100, 0), &mut outbox), Step::Pending);
            repeated += outbox.len();
        }
        assert_eq!(repeated, 0);
        assert_eq!(query.outstanding(), 0);
        assert_eq!(query.merged(), 100);

        // Progress re-enables follow-ups.
        let mut outbox = Outbox::new();
        assert_eq!(query.on_event(&sync(1, 350, 100, 100), &mut outbox), Step::Pending);
        assert_eq!(windows(&outbox), vec![vec![RangeWindow::new(200, 299)]]);
    }

    #[test]
    fn test_channel_members_follow_ups() {
        let mut query = channel_query(QueryOptions::new());

        let mut outbox = Outbox::new();
        query.start(&mut outbox);
        assert_eq!(windows(&outbox), vec![vec![RangeWindow::new(0, 99)]]);
        assert_eq!(query.outstanding(), 1);

        for start in [0, 100, 200] {
            let mut outbox = Outbox::new();
            assert_eq!(query.on_event(&sync(1, 350, start, 100), &mut outbox), Step::Pending);
            assert_eq!(
                windows(&outbox),
                vec![vec![RangeWindow::new(start + 100, start + 199)]]
            );
            assert_eq!(query.outstanding(), 1);
        }

        let mut outbox = Outbox::new();
        let Step::Done(members) = query.on_event(&sync(1, 350, 300, 50), &mut outbox) else {
            panic!("expected completion");
        };
        assert!(outbox.is_empty());
        assert_eq!(ids(&members), (0..350).collect::<Vec<_>>());
        assert!(members.iter().all(|m| m.guild_id == Some(Snowflake(1))));
    }

    #[test]
    fn test_channel_members_count_cap() {
        let mut query = channel_query(QueryOptions::new().with_count(50));
        let mut outbox = Outbox::new();
        query.start(&mut outbox);

        let mut outbox = Outbox::new();
        let Step::Done(members) = query.on_event(&sync(1, 350, 0, 100), &mut outbox) else {
            panic!("expected completion");
        };
        assert!(outbox.is_empty());
        assert_eq!(ids(&members), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_channel_members_offset() {
        let mut query = channel_query(QueryOptions::new().with_offset(200));
        let mut outbox = Outbox::new();
        query.start(&mut outbox);
        assert_eq!(windows(&outbox), vec![vec![RangeWindow::new(200, 299)]]);

        let Step::Done(members) = query.on_event(&sync(1, 250, 200, 50), &mut Outbox::new()) else {
            panic!("expected completion");
        };
        assert_eq!(ids(&members), (200..250).collect::<Vec<_>>());
    }

    #[test]
    fn test_other_guild_does_not_match() {
        let query = channel_query(QueryOptions::new());
        assert!(!query.matches(&sync(5, 350, 0, 100)));
        assert!(!query.matches(&GatewayEvent::HeartbeatAck));
    }

    #[test]
    fn test_update_without_sync_is_noop() {
        let mut query = channel_query(QueryOptions::new());
        query.start(&mut Outbox::new());

        let event = GatewayEvent::GuildMemberListUpdate(GuildMemberListUpdate {
            guild_id: Snowflake(1),
            id: None,
            member_count: 0,
            online_count: 0,
            groups: vec![],
            ops: vec![
                MemberListOperation::Delete { index: 3 },
                MemberListOperation::Unknown,
            ],
        });

        let mut outbox = Outbox::new();
        assert_eq!(query.on_event(&event, &mut outbox), Step::Pending);
        assert!(outbox.is_empty());
        assert_eq!(query.outstanding(), 1);
        assert_eq!(query.merged(), 0);
    }

    #[test]
    fn test_sync_without_range_is_skipped() {
        let mut query = channel_query(QueryOptions::new());
        query.start(&mut Outbox::new());

        let event = GatewayEvent::GuildMemberListUpdate(GuildMemberListUpdate {
            guild_id: Snowflake(1),
            id: None,
            member_count: 10,
            online_count: 10,
            groups: vec![MemberListGroup {
                id: "online".to_string(),
                count: 10,
            }],
            ops: vec![MemberListOperation::Sync {
                range: None,
                items: vec![MemberListItem::member(member(1))],
            }],
        });

        let mut outbox = Outbox::new();
        assert_eq!(query.on_event(&event, &mut outbox), Step::Pending);
        assert_eq!(query.merged(), 0);
        assert_eq!(query.outstanding(), 0);
        // Nothing merged yet, so no follow-up either.
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_empty_list_resolves_empty() {
        let mut query = channel_query(QueryOptions::new());
        query.start(&mut Outbox::new());

        let event = GatewayEvent::GuildMemberListUpdate(GuildMemberListUpdate {
            guild_id: Snowflake(1),
            id: None,
            member_count: 0,
            online_count: 0,
            groups: vec![],
            ops: vec![MemberListOperation::Sync {
                range: Some(RangeWindow::new(0, 99)),
                items: vec![],
            }],
        });

        assert_eq!(query.on_event(&event, &mut Outbox::new()), Step::Done(vec![]));
    }
}
