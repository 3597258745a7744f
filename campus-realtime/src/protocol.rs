//! Binary frame envelope for the realtime channel transport.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┐
//! │ kind     │ conn_id   │ topic    │ payload  │
//! │ 1 byte   │ 16 bytes  │ variable │ variable │
//! └──────────┴───────────┴──────────┴──────────┘
//! ```
//!
//! Payload encoding depends on `kind`:
//! - `Subscribe`, `Track`, `PresenceState`, `PresenceDiff`: bincode
//! - `Broadcast`, `RowChange`: JSON (see [`crate::events`])
//! - `Error`: UTF-8 text
//! - everything else: empty
//!
//! `conn_id` is assigned by the server and echoed in `Subscribed`.
//! Frames sent by the server on its own behalf carry `Uuid::nil()`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::events::{BroadcastEvent, RowChange};
use crate::presence::{PresenceDiff, PresenceRecord};

/// Frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    /// Client joins a topic
    Subscribe = 1,
    /// Server confirms a subscription
    Subscribed = 2,
    /// Client leaves a topic
    Unsubscribe = 3,
    /// Fan-out payload
    Broadcast = 4,
    /// Client publishes its presence record
    Track = 5,
    /// Client withdraws its presence record
    Untrack = 6,
    /// Full presence snapshot
    PresenceState = 7,
    /// Presence joins/leaves
    PresenceDiff = 8,
    /// Server-side row change
    RowChange = 9,
    /// Heartbeat ping
    Ping = 10,
    /// Heartbeat pong
    Pong = 11,
    /// Server-side rejection
    Error = 12,
}

/// Options sent with `Subscribe`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Map key for this connection's presence. Server falls back to the
    /// connection id.
    pub presence_key: Option<String>,
    /// Deliver this connection's own broadcasts back to it.
    pub receive_own: bool,
}

/// Top-level protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub conn_id: Uuid,
    pub topic: String,
    pub payload: Vec<u8>,
}

fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn from_bincode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(value)
}

impl Frame {
    fn new(kind: FrameKind, conn_id: Uuid, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind,
            conn_id,
            topic: topic.into(),
            payload,
        }
    }

    pub fn subscribe(
        conn_id: Uuid,
        topic: impl Into<String>,
        options: &SubscribeOptions,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(FrameKind::Subscribe, conn_id, topic, to_bincode(options)?))
    }

    pub fn subscribed(conn_id: Uuid, topic: impl Into<String>) -> Self {
        Self::new(FrameKind::Subscribed, conn_id, topic, Vec::new())
    }

    pub fn unsubscribe(conn_id: Uuid, topic: impl Into<String>) -> Self {
        Self::new(FrameKind::Unsubscribe, conn_id, topic, Vec::new())
    }

    pub fn broadcast(
        conn_id: Uuid,
        topic: impl Into<String>,
        event: &BroadcastEvent,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(FrameKind::Broadcast, conn_id, topic, event.encode()?))
    }

    pub fn track(
        conn_id: Uuid,
        topic: impl Into<String>,
        record: &PresenceRecord,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(FrameKind::Track, conn_id, topic, to_bincode(record)?))
    }

    pub fn untrack(conn_id: Uuid, topic: impl Into<String>) -> Self {
        Self::new(FrameKind::Untrack, conn_id, topic, Vec::new())
    }

    pub fn presence_state(
        topic: impl Into<String>,
        snapshot: &HashMap<String, PresenceRecord>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(FrameKind::PresenceState, Uuid::nil(), topic, to_bincode(snapshot)?))
    }

    pub fn presence_diff(
        topic: impl Into<String>,
        diff: &PresenceDiff,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(FrameKind::PresenceDiff, Uuid::nil(), topic, to_bincode(diff)?))
    }

    pub fn row_change(topic: impl Into<String>, change: &RowChange) -> Result<Self, ProtocolError> {
        Ok(Self::new(FrameKind::RowChange, Uuid::nil(), topic, change.encode()?))
    }

    pub fn ping(conn_id: Uuid) -> Self {
        Self::new(FrameKind::Ping, conn_id, String::new(), Vec::new())
    }

    pub fn pong(conn_id: Uuid) -> Self {
        Self::new(FrameKind::Pong, conn_id, String::new(), Vec::new())
    }

    pub fn error(conn_id: Uuid, topic: impl Into<String>, message: &str) -> Self {
        Self::new(FrameKind::Error, conn_id, topic, message.as_bytes().to_vec())
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        to_bincode(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        from_bincode(bytes)
    }

    fn expect(&self, expected: FrameKind) -> Result<(), ProtocolError> {
        if self.kind != expected {
            return Err(ProtocolError::UnexpectedKind {
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }

    pub fn subscribe_options(&self) -> Result<SubscribeOptions, ProtocolError> {
        self.expect(FrameKind::Subscribe)?;
        from_bincode(&self.payload)
    }

    pub fn broadcast_event(&self) -> Result<BroadcastEvent, ProtocolError> {
        self.expect(FrameKind::Broadcast)?;
        BroadcastEvent::decode(&self.payload)
    }

    pub fn presence_record(&self) -> Result<PresenceRecord, ProtocolError> {
        self.expect(FrameKind::Track)?;
        from_bincode(&self.payload)
    }

    pub fn presence_snapshot(&self) -> Result<HashMap<String, PresenceRecord>, ProtocolError> {
        self.expect(FrameKind::PresenceState)?;
        from_bincode(&self.payload)
    }

    pub fn diff(&self) -> Result<PresenceDiff, ProtocolError> {
        self.expect(FrameKind::PresenceDiff)?;
        from_bincode(&self.payload)
    }

    pub fn change(&self) -> Result<RowChange, ProtocolError> {
        self.expect(FrameKind::RowChange)?;
        RowChange::decode(&self.payload)
    }

    pub fn error_message(&self) -> Result<String, ProtocolError> {
        self.expect(FrameKind::Error)?;
        Ok(String::from_utf8_lossy(&self.payload).into_owned())
    }
}
