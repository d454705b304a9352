//! Outbound gateway commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::ProtocolError;
use crate::frames::{Frame, Opcode};
use crate::model::{RangeWindow, Snowflake};

/// Client properties sent with `Identify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "muster".to_string(),
            device: "muster".to_string(),
        }
    }
}

/// Session authentication payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    pub token: String,
    pub properties: ConnectionProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intents: Option<u64>,
}

impl Identify {
    /// Create an identify payload with default properties.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: ConnectionProperties::default(),
            intents: None,
        }
    }
}

/// Simple member list request: all members of a guild, answered by
/// `GUILD_MEMBERS_CHUNK` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberQuery {
    pub guild_id: Snowflake,
    /// Username prefix filter; empty selects everyone.
    pub query: String,
    /// Maximum members to return, `0` for no limit.
    pub limit: u32,
}

impl GuildMemberQuery {
    /// Request every member of `guild_id`, up to `limit`.
    #[must_use]
    pub fn new(guild_id: Snowflake, limit: u32) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit,
        }
    }
}

/// Ranged member list request, answered by `GUILD_MEMBER_LIST_UPDATE` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberListQuery {
    pub guild_id: Snowflake,
    /// Requested windows per channel.
    pub channels: BTreeMap<Snowflake, Vec<RangeWindow>>,
}

impl MemberListQuery {
    /// Request `windows` of the member list of a single channel.
    #[must_use]
    pub fn new(guild_id: Snowflake, channel_id: Snowflake, windows: Vec<RangeWindow>) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(channel_id, windows);
        Self { guild_id, channels }
    }
}

/// A typed outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Keepalive carrying the last seen sequence number.
    Heartbeat(Option<u64>),
    /// Authenticate the session.
    Identify(Identify),
    /// Request guild members in chunks.
    RequestGuildMembers(GuildMemberQuery),
    /// Request ranges of a channel member list.
    GuildSubscriptions(MemberListQuery),
}

impl Command {
    /// Get the opcode this command is sent with.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Heartbeat(_) => Opcode::Heartbeat,
            Command::Identify(_) => Opcode::Identify,
            Command::RequestGuildMembers(_) => Opcode::RequestGuildMembers,
            Command::GuildSubscriptions(_) => Opcode::GuildSubscriptions,
        }
    }

    /// Wrap the command in a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn into_frame(self) -> Result<Frame, ProtocolError> {
        let op = self.opcode();
        let d = match self {
            Command::Heartbeat(sequence) => serde_json::to_value(sequence)?,
            Command::Identify(identify) => serde_json::to_value(identify)?,
            Command::RequestGuildMembers(query) => serde_json::to_value(query)?,
            Command::GuildSubscriptions(query) => serde_json::to_value(query)?,
        };
        Ok(Frame::new(op, d))
    }
}
