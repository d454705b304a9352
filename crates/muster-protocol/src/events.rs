//! Inbound gateway events.
//!
//! Frames are decoded into [`GatewayEvent`] exactly once, at the transport
//! boundary. Everything downstream matches on typed variants.

use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;
use crate::frames::{Frame, Opcode};
use crate::model::{Guild, GuildMember, RangeWindow, Snowflake, User};

/// `Hello` payload, sent by the server right after connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// `READY` dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ready {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub guilds: Vec<Guild>,
}

/// `GUILD_MEMBERS_CHUNK` dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMembersChunk {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub members: Vec<GuildMember>,
    /// Zero-based index of this chunk.
    pub chunk_index: u32,
    /// Total number of chunks for the request.
    pub chunk_count: u32,
}

/// A group header in a member list (role or online/offline bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberListGroup {
    pub id: String,
    #[serde(default)]
    pub count: u32,
}

/// One entry of a member list: either a member or a group header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemberListItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<GuildMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<MemberListGroup>,
}

impl MemberListItem {
    /// Item carrying a member.
    #[must_use]
    pub fn member(member: GuildMember) -> Self {
        Self {
            member: Some(member),
            group: None,
        }
    }

    /// Item carrying a group header.
    #[must_use]
    pub fn group(group: MemberListGroup) -> Self {
        Self {
            member: None,
            group: Some(group),
        }
    }
}

/// A member list operation, tagged by its `op` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberListOperation {
    /// Full contents of a requested window.
    Sync {
        #[serde(default)]
        range: Option<RangeWindow>,
        #[serde(default)]
        items: Vec<MemberListItem>,
    },
    Insert {
        index: u32,
        item: MemberListItem,
    },
    Update {
        index: u32,
        item: MemberListItem,
    },
    Delete {
        index: u32,
    },
    Invalidate {
        #[serde(default)]
        range: Option<RangeWindow>,
    },
    /// Any operation kind this client does not know about.
    #[serde(other)]
    Unknown,
}

/// `GUILD_MEMBER_LIST_UPDATE` dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberListUpdate {
    pub guild_id: Snowflake,
    /// Member list identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub online_count: u32,
    #[serde(default)]
    pub groups: Vec<MemberListGroup>,
    #[serde(default)]
    pub ops: Vec<MemberListOperation>,
}

impl GuildMemberListUpdate {
    /// Total members in the list, summed over all groups.
    ///
    /// Counts come from the server; the sum saturates instead of overflowing.
    #[must_use]
    pub fn combined_count(&self) -> u32 {
        self.groups
            .iter()
            .map(|g| g.count)
            .fold(0u32, u32::saturating_add)
    }
}

/// A typed inbound gateway event.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Hello(Hello),
    HeartbeatAck,
    /// Server asks the client to reconnect.
    Reconnect,
    InvalidSession {
        resumable: bool,
    },
    Ready(Ready),
    GuildCreate(Guild),
    GuildDelete(Guild),
    GuildMembersChunk(GuildMembersChunk),
    GuildMemberListUpdate(GuildMemberListUpdate),
    /// A dispatch event this client does not decode.
    Dispatch {
        name: String,
    },
    /// The session ended. Synthesized locally, never sent by the server.
    Disconnected,
}

impl GatewayEvent {
    /// Decode a frame into an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the opcode is not an inbound one, a dispatch frame
    /// has no event name, or the payload does not match the event shape.
    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let Frame { op, d, t, .. } = frame;

        let event = match op {
            Opcode::Hello => GatewayEvent::Hello(serde_json::from_value(d)?),
            Opcode::HeartbeatAck => GatewayEvent::HeartbeatAck,
            Opcode::Reconnect => GatewayEvent::Reconnect,
            Opcode::InvalidSession => GatewayEvent::InvalidSession {
                resumable: d.as_bool().unwrap_or(false),
            },
            Opcode::Dispatch => {
                let name = t.ok_or_else(|| {
                    ProtocolError::Invalid("dispatch frame without event name".to_string())
                })?;
                match name.as_str() {
                    "READY" => GatewayEvent::Ready(serde_json::from_value(d)?),
                    "GUILD_CREATE" => GatewayEvent::GuildCreate(serde_json::from_value(d)?),
                    "GUILD_DELETE" => GatewayEvent::GuildDelete(serde_json::from_value(d)?),
                    "GUILD_MEMBERS_CHUNK" => {
                        GatewayEvent::GuildMembersChunk(serde_json::from_value(d)?)
                    }
                    "GUILD_MEMBER_LIST_UPDATE" => {
                        GatewayEvent::GuildMemberListUpdate(serde_json::from_value(d)?)
                    }
                    _ => GatewayEvent::Dispatch { name },
                }
            }
            other => {
                return Err(ProtocolError::Invalid(format!(
                    "unexpected inbound opcode {other:?}"
                )))
            }
        };

        Ok(event)
    }

    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::Hello(_) => "HELLO",
            GatewayEvent::HeartbeatAck => "HEARTBEAT_ACK",
            GatewayEvent::Reconnect => "RECONNECT",
            GatewayEvent::InvalidSession { .. } => "INVALID_SESSION",
            GatewayEvent::Ready(_) => "READY",
            GatewayEvent::GuildCreate(_) => "GUILD_CREATE",
            GatewayEvent::GuildDelete(_) => "GUILD_DELETE",
            GatewayEvent::GuildMembersChunk(_) => "GUILD_MEMBERS_CHUNK",
            GatewayEvent::GuildMemberListUpdate(_) => "GUILD_MEMBER_LIST_UPDATE",
            GatewayEvent::Dispatch { name } => name,
            GatewayEvent::Disconnected => "DISCONNECTED",
        }
    }

    /// Guild the event refers to, if any.
    #[must_use]
    pub fn guild_id(&self) -> Option<Snowflake> {
        match self {
            GatewayEvent::GuildCreate(guild) | GatewayEvent::GuildDelete(guild) => Some(guild.id),
            GatewayEvent::GuildMembersChunk(chunk) => Some(chunk.guild_id),
            GatewayEvent::GuildMemberListUpdate(update) => Some(update.guild_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list_update_frame() -> Frame {
        Frame::dispatch(
            "GUILD_MEMBER_LIST_UPDATE",
            3,
            json!({
                "guild_id": "10",
                "id": "everyone",
                "member_count": 3,
                "online_count": 1,
                "groups": [{"id": "online", "count": 1}, {"id": "offline", "count": 2}],
                "ops": [{
                    "op": "SYNC",
                    "range": [0, 99],
                    "items": [
                        {"group": {"id": "online", "count": 1}},
                        {"member": {"user": {"id": "1", "username": "a"}, "roles": []}},
                        {"group": {"id": "offline", "count": 2}},
                        {"member": {"user": {"id": "2", "username": "b"}, "roles": []}},
                        {"member": {"user": {"id": "3", "username": "c"}, "roles": []}}
                    ]
                }]
            }),
        )
    }

    #[test]
    fn test_decode_member_list_update() {
        let event = GatewayEvent::from_frame(list_update_frame()).unwrap();
        let GatewayEvent::GuildMemberListUpdate(update) = event else {
            panic!("expected member list update");
        };

        assert_eq!(update.guild_id, Snowflake(10));
        assert_eq!(update.combined_count(), 3);
        match &update.ops[0] {
            MemberListOperation::Sync { range, items } => {
                assert_eq!(*range, Some(RangeWindow::new(0, 99)));
                assert_eq!(items.len(), 5);
                assert_eq!(items.iter().filter(|i| i.member.is_some()).count(), 3);
            }
            other => panic!("expected SYNC, got {other:?}"),
        }
    }

    #[test]
    fn test_combined_count_saturates() {
        let update = GuildMemberListUpdate {
            guild_id: Snowflake(10),
            id: None,
            member_count: 0,
            online_count: 0,
            groups: vec![
                MemberListGroup {
                    id: "online".to_string(),
                    count: u32::MAX,
                },
                MemberListGroup {
                    id: "offline".to_string(),
                    count: 5,
                },
            ],
            ops: vec![],
        };
        assert_eq!(update.combined_count(), u32::MAX);
    }

    #[test]
    fn test_decode_sync_without_range() {
        let op: MemberListOperation =
            serde_json::from_value(json!({"op": "SYNC", "items": []})).unwrap();
        assert_eq!(
            op,
            MemberListOperation::Sync {
                range: None,
                items: vec![]
            }
        );
    }

    #[test]
    fn test_decode_unknown_operation() {
        let op: MemberListOperation =
            serde_json::from_value(json!({"op": "SHUFFLE", "index": 1})).unwrap();
        assert_eq!(op, MemberListOperation::Unknown);

        let op: MemberListOperation =
            serde_json::from_value(json!({"op": "DELETE", "index": 4})).unwrap();
        assert_eq!(op, MemberListOperation::Delete { index: 4 });
    }

    #[test]
    fn test_decode_members_chunk() {
        let frame = Frame::dispatch(
            "GUILD_MEMBERS_CHUNK",
            1,
            json!({
                "guild_id": "5",
                "members": [{"user": {"id": "1", "username": "a"}}],
                "chunk_index": 0,
                "chunk_count": 1
            }),
        );
        let event = GatewayEvent::from_frame(frame).unwrap();
        assert_eq!(event.name(), "GUILD_MEMBERS_CHUNK");
        assert_eq!(event.guild_id(), Some(Snowflake(5)));
    }

    #[test]
    fn test_decode_control_frames() {
        let hello = Frame::new(Opcode::Hello, json!({"heartbeat_interval": 41250}));
        assert_eq!(
            GatewayEvent::from_frame(hello).unwrap(),
            GatewayEvent::Hello(Hello {
                heartbeat_interval: 41250
            })
        );

        let invalid = Frame::new(Opcode::InvalidSession, json!(true));
        assert_eq!(
            GatewayEvent::from_frame(invalid).unwrap(),
            GatewayEvent::InvalidSession { resumable: true }
        );

        let other = Frame::dispatch("TYPING_START", 9, json!({}));
        assert_eq!(
            GatewayEvent::from_frame(other).unwrap(),
            GatewayEvent::Dispatch {
                name: "TYPING_START".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        let outbound = Frame::new(Opcode::Identify, json!({}));
        assert!(matches!(
            GatewayEvent::from_frame(outbound),
            Err(ProtocolError::Invalid(_))
        ));

        let unnamed = Frame::new(Opcode::Dispatch, json!({}));
        assert!(GatewayEvent::from_frame(unnamed).is_err());

        let malformed = Frame::dispatch("GUILD_MEMBERS_CHUNK", 1, json!({"guild_id": "1"}));
        assert!(matches!(
            GatewayEvent::from_frame(malformed),
            Err(ProtocolError::Json(_))
        ));
    }
}
