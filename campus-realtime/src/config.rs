//! Server and client tuning knobs.

use serde::Deserialize;
use std::time::Duration;

/// Realtime server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum subscribers per topic
    pub max_members_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Frames buffered per connection before forwarders wait
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            max_members_per_room: 100,
            broadcast_capacity: 256,
            outbound_queue: 256,
        }
    }
}

/// Realtime client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Events buffered per channel
    pub event_queue: usize,
    /// Frames buffered towards the socket writer
    pub outbound_queue: usize,
    /// How long `CallController::request` waits for an ack
    pub control_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            event_queue: 256,
            outbound_queue: 256,
            control_timeout: Duration::from_secs(2),
        }
    }
}
