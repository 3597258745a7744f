//! Broadcast payloads and row-change feed items.
//!
//! Broadcast payloads are JSON objects tagged by `type`, the shape every
//! browser client already speaks:
//!
//! ```text
//! {"type":"path","stroke":{...}}
//! {"type":"shape","shape":{...}}
//! {"type":"clear"}
//! {"type":"chat","line":{...}}
//! {"type":"achievement","user_id":"...","achievement_id":"...","title":"..."}
//! ```
//!
//! Delivery is at-most-once and best-effort. There is no acknowledgement,
//! no deduplication and no conflict resolution: two senders editing the
//! same object both apply, in arrival order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// 2D point in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A freehand stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: Uuid,
    pub points: Vec<Point>,
    pub color: String,
    pub width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rect,
    Circle,
    Line,
    Text,
}

/// A placed shape. `text` is only meaningful for `ShapeKind::Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: Uuid,
    pub kind: ShapeKind,
    pub origin: Point,
    pub width: f32,
    pub height: f32,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One chat line as sent by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub text: String,
    /// Milliseconds since the Unix epoch, sender clock.
    pub sent_at_ms: u64,
}

/// Everything a room can fan out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    #[serde(rename = "path")]
    PathDrawn { stroke: Stroke },

    #[serde(rename = "shape")]
    ShapeAdded { shape: Shape },

    #[serde(rename = "clear")]
    Cleared,

    #[serde(rename = "chat")]
    ChatMessage { line: ChatLine },

    #[serde(rename = "achievement")]
    AchievementUnlocked {
        user_id: String,
        achievement_id: String,
        title: String,
    },

    /// Any tag this build does not know. Receive-only.
    #[serde(other)]
    Unknown,
}

impl BroadcastEvent {
    /// Wire tag of this event.
    pub fn tag(&self) -> &'static str {
        match self {
            BroadcastEvent::PathDrawn { .. } => "path",
            BroadcastEvent::ShapeAdded { .. } => "shape",
            BroadcastEvent::Cleared => "clear",
            BroadcastEvent::ChatMessage { .. } => "chat",
            BroadcastEvent::AchievementUnlocked { .. } => "achievement",
            BroadcastEvent::Unknown => "unknown",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if matches!(self, BroadcastEvent::Unknown) {
            return Err(ProtocolError::UnsendableEvent);
        }
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a payload. Unrecognized tags yield `Unknown`, not an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Kind of row mutation carried by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-change notification published to a topic by the server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    #[serde(rename = "eventType")]
    pub event: ChangeKind,
    pub record: serde_json::Value,
}

impl RowChange {
    pub fn new(table: impl Into<String>, event: ChangeKind, record: serde_json::Value) -> Self {
        Self {
            table: table.into(),
            event,
            record,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}
