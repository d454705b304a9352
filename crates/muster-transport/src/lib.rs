//! # muster-transport
//!
//! Gateway connection layer for Muster.
//!
//! - **Connection** - Frame-level connection abstraction
//! - **WebSocketConnection** - Client connection over tokio-tungstenite
//! - **GatewaySession** - Drives a connection: identify, heartbeat, dispatch
//!
//! ## Session Driver
//!
//! The session decodes every inbound frame once and publishes the resulting
//! [`muster_protocol::GatewayEvent`] on a [`muster_core::EventBus`]. Commands
//! queued on the session's sender are written to the connection in order.
//!
//! ```rust,ignore
//! use muster_transport::{GatewaySession, WebSocketConfig, WebSocketConnection};
//!
//! let connection = WebSocketConnection::connect(url, WebSocketConfig::default()).await?;
//! let (session, commands) = GatewaySession::new(bus.clone(), identify);
//! tokio::spawn(session.run(connection));
//! ```

pub mod session;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use session::{GatewaySession, SessionEnd};
pub use traits::{Connection, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection};
