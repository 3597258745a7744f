//! # campus-realtime — Realtime layer for the campus marketplace
//!
//! Provides topic channels over WebSocket with presence, broadcast fan-out
//! and a server-fed row-change feed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     WebSocket      ┌────────────────┐
//! │ RealtimeClient │ ◄────────────────► │ RealtimeServer │
//! │  └─ Channel    │    Binary Frames   │  └─ Hub        │
//! │     (per topic)│                    │     └─ Room    │
//! └───────┬────────┘                    └───────┬────────┘
//!         │                                     │
//!         ▼                                     ▼
//! ┌────────────────┐                    ┌────────────────┐
//! │ PresenceTracker│                    │ presence map   │
//! │ RoomModel      │                    │ (authoritative)│
//! └────────────────┘                    └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary frame envelope (bincode)
//! - [`events`] — Broadcast payloads and row changes (JSON)
//! - [`presence`] — Presence records, state map and tracker
//! - [`broadcast`] — Rooms and the topic hub
//! - [`server`] — WebSocket server
//! - [`client`] — WebSocket client and channel bindings
//! - [`room`] — Whiteboard/chat models fed by broadcasts
//! - [`feed`] — Notification feed consumers
//! - [`call_control`] — Video call control messages

pub mod broadcast;
pub mod call_control;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod server;

// Re-exports for convenience
pub use broadcast::{BroadcastStats, Envelope, Hub, Member, Room};
pub use call_control::{CallCommand, CallController, ControlAck, ControlMessage, ControlTransport};
pub use client::{
    Channel, ChannelEvent, ChannelOptions, ConnectionState, PresenceOptions, RealtimeClient,
};
pub use config::{ClientConfig, ServerConfig};
pub use error::{ProtocolError, RealtimeError};
pub use events::{
    BroadcastEvent, ChangeKind, ChatLine, Point, RowChange, Shape, ShapeKind, Stroke,
};
pub use feed::{notification_topic, NotificationBadge, NOTIFICATIONS_TABLE};
pub use presence::{
    pick_color, Cursor, LocalIdentity, PresenceDiff, PresencePhase, PresenceRecord,
    PresenceState, PresenceTracker, PALETTE,
};
pub use protocol::{Frame, FrameKind, SubscribeOptions};
pub use room::{ChatLog, RoomModel, UnlockedAchievement, Whiteboard};
pub use server::{RealtimeServer, ServerStats};
