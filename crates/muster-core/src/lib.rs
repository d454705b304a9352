//! # muster-core
//!
//! Query correlation on top of a push-based gateway.
//!
//! The gateway answers commands with unsolicited events that carry no
//! request id. This crate turns a logical query ("all members of this
//! guild") into wire requests, picks the matching events out of the stream,
//! assembles partial results and resolves a single typed result.
//!
//! - **EventBus** - Fans inbound events out to subscribers
//! - **RequestSender** - Fire-and-forget outbound command seam
//! - **Correlator** - Per-query state machines with at-most-once resolution
//! - **RangePlanner** - Window planning for ranged member lists
//! - **ResultAccumulator** - Position-keyed result assembly
//! - **GatewayClient** - Public fetch operations and guild cache
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Command   ┌───────────────┐
//! │  Correlator  │───────────▶│ RequestSender │───▶ gateway
//! └──────────────┘            └───────────────┘
//!        ▲
//!        │ GatewayEvent
//! ┌──────────────┐
//! │   EventBus   │◀────────────────────────────── gateway
//! └──────────────┘
//! ```

pub mod assembly;
pub mod bus;
pub mod cache;
pub mod client;
pub mod correlator;
pub mod members;
pub mod metrics;
pub mod planner;
pub mod sender;

pub use assembly::{Fragment, QueryOptions, ResultAccumulator};
pub use bus::{EventBus, Subscription, SubscriptionId};
pub use cache::GuildCache;
pub use client::{ClientConfig, ClientError, GatewayClient};
pub use correlator::{
    CorrelationKey, Correlate, Correlator, Outbox, QueryError, QueryHandle, QueryId, Step,
};
pub use members::{ChannelMembersQuery, GuildMembersQuery};
pub use planner::{RangePlanner, DEFAULT_RANGES_PER_REQUEST, WINDOW_SIZE};
pub use sender::{RequestSender, SendError};
