//! WebSocket realtime server with topic-based routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐                       ┌── Room "whiteboard:42" ── presence map
//!             ├── Connection ── Hub ──┤
//! Client B ──┘   (per socket)        └── Room "notifications:u1"
//!                     ▲                          │
//!                     │      forwarder task      │
//!                     └──── (per subscription) ◄─┘
//! ```
//!
//! Each connection owns one outbound queue. Every topic subscription spawns a
//! forwarder that moves envelopes from the room's broadcast receiver into that
//! queue, skipping the connection's own broadcasts unless it asked for them.
//! Direct replies (`Subscribed`, the presence snapshot, `Pong`, `Error`) are
//! written by the connection loop itself.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::{Envelope, Hub, Member, Room};
use crate::config::ServerConfig;
use crate::error::RealtimeError;
use crate::protocol::{Frame, FrameKind};

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// The realtime server.
pub struct RealtimeServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    stats: Arc<RwLock<ServerStats>>,
}

impl RealtimeServer {
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(Hub::new(config.broadcast_capacity));
        Self::with_hub(config, hub)
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Serve an existing hub, shared with in-process publishers.
    pub fn with_hub(config: ServerConfig, hub: Arc<Hub>) -> Self {
        Self {
            config,
            hub,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), RealtimeError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RealtimeError> {
        log::info!("Realtime server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<Hub>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> Result<(), RealtimeError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Arc<Vec<u8>>>(config.outbound_queue);
        let mut conn = Connection {
            conn_id: Uuid::new_v4(),
            hub: hub.clone(),
            config,
            outbound: outbound_tx,
            subscriptions: HashMap::new(),
        };
        log::info!("WebSocket connection {} established from {addr}", conn.conn_id);

        let result: Result<(), RealtimeError> = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                {
                                    let mut s = stats.write().await;
                                    s.total_frames += 1;
                                    s.total_bytes += data.len() as u64;
                                }

                                let frame = match Frame::decode(&data) {
                                    Ok(frame) => frame,
                                    Err(e) => {
                                        log::warn!("Failed to decode frame from {addr}: {e}");
                                        continue;
                                    }
                                };

                                for reply in conn.dispatch(frame).await {
                                    let encoded = reply.encode()?;
                                    ws_sender.send(Message::Binary(encoded.into())).await?;
                                }
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            _ => {}
                        }
                    }

                    Some(bytes) = outbound_rx.recv() => {
                        ws_sender.send(Message::Binary(bytes.to_vec().into())).await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        conn.close().await;

        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = hub.room_count().await;
        }

        result
    }

    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_rooms = self.hub.room_count().await;
        stats
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

struct Subscription {
    room: Arc<Room>,
    forwarder: JoinHandle<()>,
}

/// Per-socket state.
struct Connection {
    conn_id: Uuid,
    hub: Arc<Hub>,
    config: ServerConfig,
    outbound: mpsc::Sender<Arc<Vec<u8>>>,
    subscriptions: HashMap<String, Subscription>,
}

impl Connection {
    /// Handle one inbound frame. Returns the frames to write back directly.
    async fn dispatch(&mut self, frame: Frame) -> Vec<Frame> {
        let topic = frame.topic.clone();
        let kind = frame.kind;

        match self.dispatch_inner(frame).await {
            Ok(replies) => replies,
            Err(Rejection::Silent(reason)) => {
                log::debug!("Ignoring {kind:?} from {} on '{topic}': {reason}", self.conn_id);
                Vec::new()
            }
            Err(Rejection::Reply(reason)) => {
                log::warn!("Rejected {kind:?} from {} on '{topic}': {reason}", self.conn_id);
                vec![Frame::error(self.conn_id, topic, &reason)]
            }
        }
    }

    async fn dispatch_inner(&mut self, frame: Frame) -> Result<Vec<Frame>, Rejection> {
        match frame.kind {
            FrameKind::Subscribe => self.subscribe(frame).await,

            FrameKind::Unsubscribe => {
                self.unsubscribe(&frame.topic).await;
                Ok(Vec::new())
            }

            FrameKind::Broadcast => {
                let room = self.subscribed_room(&frame.topic)?;
                // Stamp the real sender; clients cannot spoof origin
                let mut frame = frame;
                frame.conn_id = self.conn_id;
                room.publish(Some(self.conn_id), &frame);
                Ok(Vec::new())
            }

            FrameKind::Track => {
                let room = self.subscribed_room(&frame.topic)?;
                let record = frame
                    .presence_record()
                    .map_err(|e| Rejection::Reply(e.to_string()))?;
                room.track(&self.conn_id, record)
                    .await
                    .map_err(|e| Rejection::Reply(e.to_string()))?;
                Ok(Vec::new())
            }

            FrameKind::Untrack => {
                let room = self.subscribed_room(&frame.topic)?;
                room.untrack(&self.conn_id)
                    .await
                    .map_err(|e| Rejection::Reply(e.to_string()))?;
                Ok(Vec::new())
            }

            FrameKind::Ping => Ok(vec![Frame::pong(self.conn_id)]),

            other => Err(Rejection::Silent(format!("{other:?} is server-to-client only"))),
        }
    }

    async fn subscribe(&mut self, frame: Frame) -> Result<Vec<Frame>, Rejection> {
        let topic = frame.topic.clone();
        if self.subscriptions.contains_key(&topic) {
            return Err(Rejection::Reply(format!("already subscribed to '{topic}'")));
        }
        let options = frame
            .subscribe_options()
            .map_err(|e| Rejection::Reply(e.to_string()))?;

        let member = Member {
            conn_id: self.conn_id,
            presence_key: options
                .presence_key
                .unwrap_or_else(|| self.conn_id.to_string()),
            receive_own: options.receive_own,
        };
        let Some((room, rx)) = self
            .hub
            .join(&topic, member, self.config.max_members_per_room)
            .await
        else {
            return Err(Rejection::Reply(format!("topic '{topic}' is full")));
        };
        let forwarder = tokio::spawn(forward(
            rx,
            self.outbound.clone(),
            self.conn_id,
            options.receive_own,
            topic.clone(),
        ));

        let snapshot = room.presence_snapshot().await;
        self.subscriptions.insert(
            topic.clone(),
            Subscription {
                room,
                forwarder,
            },
        );
        log::info!("Connection {} subscribed to '{topic}'", self.conn_id);

        let state = Frame::presence_state(topic.clone(), &snapshot)
            .map_err(|e| Rejection::Reply(e.to_string()))?;
        Ok(vec![Frame::subscribed(self.conn_id, topic), state])
    }

    async fn unsubscribe(&mut self, topic: &str) {
        let Some(subscription) = self.subscriptions.remove(topic) else {
            return;
        };
        subscription.forwarder.abort();
        if let Err(e) = subscription.room.leave(&self.conn_id).await {
            log::warn!("Failed to publish leave for {} on '{topic}': {e}", self.conn_id);
        }
        self.hub.remove_if_empty(topic).await;
        log::info!("Connection {} left '{topic}'", self.conn_id);
    }

    fn subscribed_room(&self, topic: &str) -> Result<Arc<Room>, Rejection> {
        self.subscriptions
            .get(topic)
            .map(|s| s.room.clone())
            .ok_or_else(|| Rejection::Reply(format!("not subscribed to '{topic}'")))
    }

    /// Leave every topic.
    async fn close(&mut self) {
        let topics: Vec<String> = self.subscriptions.keys().cloned().collect();
        for topic in topics {
            self.unsubscribe(&topic).await;
        }
    }
}

enum Rejection {
    /// Logged and dropped.
    Silent(String),
    /// Reported to the client as an `Error` frame.
    Reply(String),
}

/// Move envelopes from a room into the connection's outbound queue.
async fn forward(
    mut rx: broadcast::Receiver<Envelope>,
    outbound: mpsc::Sender<Arc<Vec<u8>>>,
    conn_id: Uuid,
    receive_own: bool,
    topic: String,
) {
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                if envelope.origin == Some(conn_id) && !receive_own {
                    continue;
                }
                if outbound.send(envelope.bytes).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Connection {conn_id} lagged by {n} frames on '{topic}'");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
