//! Error types for the realtime layer.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::FrameKind;

/// Frame and payload codec errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("expected {expected:?} frame, got {actual:?}")]
    UnexpectedKind { expected: FrameKind, actual: FrameKind },

    /// `BroadcastEvent::Unknown` only exists on the receive side.
    #[error("unknown broadcast events cannot be sent")]
    UnsendableEvent,
}

/// Connection, channel-lifecycle and control errors.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("a channel for topic '{0}' is already open on this client")]
    ChannelAlreadyOpen(String),

    #[error("channel '{0}' is not subscribed")]
    NotSubscribed(String),

    #[error("channel '{0}' was torn down")]
    ChannelClosed(String),

    #[error("no acknowledgement within {0:?}")]
    Timeout(Duration),
}
