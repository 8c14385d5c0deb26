//! Wire codec (§4.A): a textual `{type, flag, data, timestamp}` envelope.
//!
//! Encoding and decoding never touch I/O; [`crate::net::connection`] owns
//! the socket and hands this module raw bytes.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Request,
    Response,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum MessageFlag {
    Heartbeat = 0,
    Version = 1,
    Transaction = 2,
    Address = 3,
    Block = 4,
    Campaign = 5,
    Query = 6,
}

impl MessageFlag {
    pub fn from_i64(value: i64) -> Result<Self, CodecError> {
        match value {
            0 => Ok(MessageFlag::Heartbeat),
            1 => Ok(MessageFlag::Version),
            2 => Ok(MessageFlag::Transaction),
            3 => Ok(MessageFlag::Address),
            4 => Ok(MessageFlag::Block),
            5 => Ok(MessageFlag::Campaign),
            6 => Ok(MessageFlag::Query),
            other => Err(CodecError::UnknownFlag(other)),
        }
    }
}

/// One on-the-wire message: a request or response carrying a flag-typed
/// payload and an ISO-8601 timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    pub flag: MessageFlag,
    pub data: Value,
    pub timestamp: String,
}

/// Envelope shape on the wire: `flag` and `timestamp` travel as their raw
/// JSON representations (`flag` as an integer) so malformed envelopes
/// fail to parse instead of silently defaulting.
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    message_type: MessageType,
    flag: i64,
    data: Value,
    timestamp: String,
}

impl Message {
    pub fn new(message_type: MessageType, flag: MessageFlag, data: Value) -> Self {
        Self {
            message_type,
            flag,
            data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Serializes to the textual envelope described in §6.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let raw = RawEnvelope {
            message_type: self.message_type,
            flag: self.flag as i64,
            data: self.data.clone(),
            timestamp: self.timestamp.clone(),
        };
        Ok(serde_json::to_vec(&raw)?)
    }

    /// Parses the textual envelope, rejecting malformed shapes and
    /// unknown flags. Payload schema validation against the (type, flag)
    /// table happens in [`crate::net::dispatcher`], not here.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(|_| CodecError::Malformed)?;
        let flag = MessageFlag::from_i64(raw.flag)?;
        Ok(Self {
            message_type: raw.message_type,
            flag,
            data: raw.data,
            timestamp: raw.timestamp,
        })
    }
}
