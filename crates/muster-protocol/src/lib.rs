//! # muster-protocol
//!
//! Wire model for the Muster gateway client.
//!
//! The gateway is a push-based socket: the client sends fire-and-forget
//! commands and the server streams events. Every message travels inside a
//! [`Frame`] envelope tagged with an [`Opcode`].
//!
//! ## Message Types
//!
//! - [`Command`] - Typed outbound payloads (identify, heartbeat, member queries)
//! - [`GatewayEvent`] - Typed inbound events, decoded once from a frame
//! - [`GuildMember`], [`Guild`], [`Snowflake`] - Shared model types
//!
//! ## Example
//!
//! ```rust
//! use muster_protocol::{codec, Command, Encoding, GuildMemberQuery, Snowflake};
//!
//! let command = Command::RequestGuildMembers(GuildMemberQuery::new(Snowflake(42), 0));
//! let frame = command.into_frame().unwrap();
//!
//! let encoded = codec::encode(&frame, Encoding::Json).unwrap();
//! let decoded = codec::decode(&encoded, Encoding::Json).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod commands;
pub mod events;
pub mod frames;
pub mod model;
pub mod version;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use commands::{Command, ConnectionProperties, GuildMemberQuery, Identify, MemberListQuery};
pub use events::{
    GatewayEvent, GuildMemberListUpdate, GuildMembersChunk, Hello, MemberListGroup,
    MemberListItem, MemberListOperation, Ready,
};
pub use frames::{Frame, Opcode};
pub use model::{Guild, GuildMember, RangeWindow, Snowflake, User};
pub use version::{ApiVersion, API_VERSION};
