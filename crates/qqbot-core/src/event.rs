//! Inbound gateway events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type of the handshake acknowledgement carrying a fresh session.
pub const READY: &str = "READY";
/// Event type confirming a successful resume.
pub const RESUMED: &str = "RESUMED";
/// Event type for a message mentioning the bot in a group.
pub const GROUP_AT_MESSAGE_CREATE: &str = "GROUP_AT_MESSAGE_CREATE";

/// Gateway opcodes. The numeric values are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Application-level event.
    Dispatch,
    /// Client keepalive carrying the last sequence.
    Heartbeat,
    /// Start a brand-new session.
    Identify,
    /// Re-attach to a previous session.
    Resume,
    /// Server asks the client to reconnect.
    Reconnect,
    /// First frame from the server, carries the heartbeat interval.
    Hello,
    /// Server acknowledged a heartbeat.
    HeartbeatAck,
    /// Anything this client does not know about.
    Unknown(u8),
}

impl Opcode {
    /// Numeric wire value.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for Opcode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            6 => Self::Resume,
            7 => Self::Reconnect,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

/// A decoded gateway frame. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Raw opcode.
    pub op: u8,
    /// Sequence number, present on dispatch events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event type, present on dispatch events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// Payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub d: Value,
}

impl InboundEvent {
    /// Decode a text frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a JSON object with an `op` field.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build a dispatch event (mostly useful for tests and simulators).
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, payload: Value) -> Self {
        Self {
            op: Opcode::Dispatch.code(),
            s: Some(sequence),
            t: Some(event_type.into()),
            d: payload,
        }
    }

    /// Typed opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        Opcode::from(self.op)
    }

    /// Whether this is an application-level event.
    #[must_use]
    pub fn is_dispatch(&self) -> bool {
        self.opcode() == Opcode::Dispatch
    }

    /// Event type, if any.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Whether the payload object is present.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        !self.d.is_null()
    }
}
