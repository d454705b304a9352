//! Gateway session driver.
//!
//! Owns one [`Connection`] for its lifetime:
//!
//! - on `Hello`, identifies and starts heartbeating at the advertised interval
//! - decodes inbound frames into [`GatewayEvent`]s and publishes them on the bus
//! - writes queued [`Command`]s to the connection
//! - publishes [`GatewayEvent::Disconnected`] when it ends, however it ends

use crate::traits::{Connection, TransportError};
use muster_core::EventBus;
use muster_protocol::{Command, GatewayEvent, Identify};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Why a session ended without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection or the command channel closed.
    Closed,
    /// The gateway asked for a reconnect.
    Reconnect,
    /// The gateway invalidated the session.
    InvalidSession { resumable: bool },
}

/// Drives a gateway connection.
pub struct GatewaySession {
    bus: EventBus,
    identify: Identify,
    commands: mpsc::UnboundedReceiver<Command>,
    sequence: Option<u64>,
}

impl GatewaySession {
    /// Create a session publishing on `bus`.
    ///
    /// Returns the session and the sender used to queue commands on it,
    /// which doubles as a [`muster_core::RequestSender`].
    #[must_use]
    pub fn new(bus: EventBus, identify: Identify) -> (Self, mpsc::UnboundedSender<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            bus,
            identify,
            commands: rx,
            sequence: None,
        };
        (session, tx)
    }

    /// Last dispatch sequence number seen.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Run the session until the connection ends.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if a heartbeat goes unacknowledged, or the
    /// connection's error.
    pub async fn run<C: Connection>(mut self, mut connection: C) -> Result<SessionEnd, TransportError> {
        let result = self.drive(&mut connection).await;

        if connection.is_open() {
            if let Err(e) = connection.close().await {
                debug!(error = %e, "Failed to close connection");
            }
        }

        match &result {
            Ok(end) => info!(?end, "Gateway session ended"),
            Err(e) => warn!(error = %e, "Gateway session failed"),
        }

        self.bus.dispatch(&GatewayEvent::Disconnected);
        result
    }

    async fn drive<C: Connection>(&mut self, connection: &mut C) -> Result<SessionEnd, TransportError> {
        let mut heartbeat: Option<Interval> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                frame = connection.recv() => {
                    let Some(frame) = frame? else {
                        return Ok(SessionEnd::Closed);
                    };
                    if frame.s.is_some() {
                        self.sequence = frame.s;
                    }

                    let event = match GatewayEvent::from_frame(frame) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable event");
                            continue;
                        }
                    };

                    let mut end = None;
                    match &event {
                        GatewayEvent::Hello(hello) => {
                            let period = Duration::from_millis(hello.heartbeat_interval.max(1));
                            let mut interval = time::interval_at(Instant::now() + period, period);
                            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            heartbeat = Some(interval);
                            awaiting_ack = false;

                            connection
                                .send(Command::Identify(self.identify.clone()).into_frame()?)
                                .await?;
                            debug!(?period, "Identified");
                        }
                        GatewayEvent::HeartbeatAck => awaiting_ack = false,
                        GatewayEvent::Ready(ready) => {
                            info!(session = %ready.session_id, guilds = ready.guilds.len(), "Gateway ready");
                        }
                        GatewayEvent::Reconnect => end = Some(SessionEnd::Reconnect),
                        GatewayEvent::InvalidSession { resumable } => {
                            end = Some(SessionEnd::InvalidSession { resumable: *resumable });
                        }
                        _ => {}
                    }

                    self.bus.dispatch(&event);
                    if let Some(end) = end {
                        return Ok(end);
                    }
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return Ok(SessionEnd::Closed);
                    };
                    trace!(op = ?command.opcode(), "Sending command");
                    connection.send(command.into_frame()?).await?;
                }

                _ = tick(&mut heartbeat) => {
                    if awaiting_ack {
                        warn!("Heartbeat was not acknowledged");
                        return Err(TransportError::Timeout);
                    }
                    connection
                        .send(Command::Heartbeat(self.sequence).into_frame()?)
                        .await?;
                    awaiting_ack = true;
                    trace!(sequence = ?self.sequence, "Heartbeat sent");
                }
            }
        }
    }
}

/// Wait for the next heartbeat, or forever before `Hello`.
async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
