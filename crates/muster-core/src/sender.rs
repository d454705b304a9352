//! Outbound request seam.
//!
//! The core never touches the socket. It hands typed [`Command`]s to a
//! [`RequestSender`], which is fire-and-forget: success means the command
//! was queued, not that the server answered.

use muster_protocol::Command;
use thiserror::Error;
use tokio::sync::mpsc;

/// Request sender errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection is gone.
    #[error("Connection closed")]
    Closed,

    /// The command could not be queued.
    #[error("Send failed: {0}")]
    Failed(String),
}

/// Fire-and-forget command sink for a gateway connection.
pub trait RequestSender: Send + Sync {
    /// Queue a command for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection can no longer accept commands.
    fn send(&self, command: Command) -> Result<(), SendError>;
}

impl RequestSender for mpsc::UnboundedSender<Command> {
    fn send(&self, command: Command) -> Result<(), SendError> {
        mpsc::UnboundedSender::send(self, command).map_err(|_| SendError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_protocol::{GuildMemberQuery, Snowflake};

    #[test]
    fn test_channel_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender: &dyn RequestSender = &tx;

        let command = Command::RequestGuildMembers(GuildMemberQuery::new(Snowflake(1), 0));
        sender.send(command.clone()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), command);

        drop(rx);
        assert_eq!(sender.send(command), Err(SendError::Closed));
    }
}
