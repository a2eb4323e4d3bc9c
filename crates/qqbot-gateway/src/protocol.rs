//! Wire payloads for the gateway handshake and keepalive.

use qqbot_core::{Opcode, ResumeToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Intents, Shard};

/// Outbound frame envelope.
#[derive(Debug, Clone, Serialize)]
struct Frame<T> {
    op: u8,
    d: T,
}

impl<T: Serialize> Frame<T> {
    fn encode(op: Opcode, d: T) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Self { op: op.code(), d })
    }
}

/// Identify payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    pub token: String,
    pub intents: u32,
    pub shard: [u32; 2],
    pub properties: Option<Value>,
}

/// Resume payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// Payload of the server's hello frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    /// Heartbeat period in milliseconds.
    pub heartbeat_interval: u64,
}

/// Payload of the `READY` dispatch event.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub session_id: String,
}

/// Encode a heartbeat carrying the last known sequence.
///
/// # Errors
/// Returns error if serialization fails.
pub fn heartbeat(sequence: Option<u64>) -> Result<String, serde_json::Error> {
    Frame::encode(Opcode::Heartbeat, sequence)
}

/// Encode an identify request.
///
/// # Errors
/// Returns error if serialization fails.
pub fn identify(token: String, intents: Intents, shard: Shard) -> Result<String, serde_json::Error> {
    Frame::encode(
        Opcode::Identify,
        Identify {
            token,
            intents: intents.bits(),
            shard: [shard.index, shard.count],
            properties: None,
        },
    )
}

/// Encode a resume request.
///
/// # Errors
/// Returns error if serialization fails.
pub fn resume(token: String, resume: &ResumeToken) -> Result<String, serde_json::Error> {
    Frame::encode(
        Opcode::Resume,
        Resume {
            token,
            session_id: resume.session_id.clone(),
            seq: resume.sequence,
        },
    )
}
