//! Gateway frame envelope.
//!
//! Every gateway message is a [`Frame`]: an opcode, an opcode-specific
//! payload `d`, and for dispatch events a sequence number `s` and event
//! name `t`. The payload stays untyped here; [`crate::Command`] and
//! [`crate::GatewayEvent`] give it a type on either side of the wire.

use serde::{Deserialize, Serialize};

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Opcode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    Resume = 6,
    Reconnect = 7,
    RequestGuildMembers = 8,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
    /// Lazy member list subscription (ranged member requests).
    GuildSubscriptions = 14,
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(Opcode::Dispatch),
            1 => Ok(Opcode::Heartbeat),
            2 => Ok(Opcode::Identify),
            6 => Ok(Opcode::Resume),
            7 => Ok(Opcode::Reconnect),
            8 => Ok(Opcode::RequestGuildMembers),
            9 => Ok(Opcode::InvalidSession),
            10 => Ok(Opcode::Hello),
            11 => Ok(Opcode::HeartbeatAck),
            14 => Ok(Opcode::GuildSubscriptions),
            _ => Err("Invalid opcode"),
        }
    }
}

/// A gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame opcode.
    pub op: Opcode,
    /// Opcode-specific payload.
    #[serde(default)]
    pub d: serde_json::Value,
    /// Sequence number, dispatch frames only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name, dispatch frames only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Frame {
    /// Create a non-dispatch frame.
    #[must_use]
    pub fn new(op: Opcode, d: serde_json::Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    /// Create a dispatch frame carrying a named event.
    #[must_use]
    pub fn dispatch(name: impl Into<String>, sequence: u64, d: serde_json::Value) -> Self {
        Self {
            op: Opcode::Dispatch,
            d,
            s: Some(sequence),
            t: Some(name.into()),
        }
    }

    /// Get the event name of a dispatch frame.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(Opcode::try_from(0), Ok(Opcode::Dispatch));
        assert_eq!(Opcode::try_from(8), Ok(Opcode::RequestGuildMembers));
        assert_eq!(Opcode::try_from(14), Ok(Opcode::GuildSubscriptions));
        assert!(Opcode::try_from(5).is_err());
        assert_eq!(u8::from(Opcode::Hello), 10);
    }

    #[test]
    fn test_frame_wire_shape() {
        let frame = Frame::new(Opcode::Heartbeat, json!(7));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"op": 1, "d": 7}));

        let frame = Frame::dispatch("READY", 1, json!({}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["t"], "READY");
        assert_eq!(value["s"], 1);
    }

    #[test]
    fn test_frame_missing_payload() {
        let frame: Frame = serde_json::from_str(r#"{"op": 11}"#).unwrap();
        assert_eq!(frame.op, Opcode::HeartbeatAck);
        assert!(frame.d.is_null());
        assert!(frame.event_name().is_none());
    }
}
