//! WebSocket realtime client and per-topic channel bindings.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - One [`Channel`] per topic, with subscribe/unsubscribe lifecycle
//! - Presence aggregation driven by the server's sync and diff frames
//! - Broadcast send/receive as typed [`BroadcastEvent`]s
//!
//! There is no reconnect or retry. A lost socket surfaces on every open
//! channel as [`ChannelEvent::Closed`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::RealtimeError;
use crate::events::{BroadcastEvent, RowChange};
use crate::presence::{LocalIdentity, PresencePhase, PresenceRecord, PresenceState, PresenceTracker};
use crate::protocol::{Frame, FrameKind, SubscribeOptions};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Events delivered to a channel's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Subscription confirmed
    Subscribed,
    /// A peer's broadcast
    Broadcast(BroadcastEvent),
    /// Full presence snapshot replaced local state
    PresenceSync(HashMap<String, PresenceRecord>),
    PresenceJoin { key: String, record: PresenceRecord },
    PresenceLeave { key: String, record: PresenceRecord },
    /// Server-side row change
    RowChange(RowChange),
    /// Server rejected a frame
    Error(String),
    /// Connection lost
    Closed,
}

/// Presence settings for a channel.
#[derive(Debug, Clone, Default)]
pub struct PresenceOptions {
    /// Map key for this side. Defaults to the identity's user id.
    pub key: Option<String>,
    /// `None` when the user lookup failed; the channel only observes.
    pub identity: Option<LocalIdentity>,
    /// Publish pointer moves through `update_cursor`.
    pub cursors: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelOptions {
    pub presence: Option<PresenceOptions>,
    /// Deliver this client's own broadcasts back to it.
    pub receive_own: bool,
}

impl ChannelOptions {
    pub fn with_presence(mut self, presence: PresenceOptions) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn receive_own(mut self, receive_own: bool) -> Self {
        self.receive_own = receive_own;
        self
    }

    fn presence_key(&self) -> Option<String> {
        let presence = self.presence.as_ref()?;
        presence
            .key
            .clone()
            .or_else(|| presence.identity.as_ref().map(|i| i.user_id.clone()))
    }
}

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

#[derive(Debug)]
enum Inbound {
    Frame(Frame),
    Closed,
}

type Routes = Arc<RwLock<HashMap<String, mpsc::Sender<Inbound>>>>;

/// One WebSocket connection. Owns the routing table for its channels.
pub struct RealtimeClient {
    config: ClientConfig,
    outgoing: mpsc::Sender<Outgoing>,
    routes: Routes,
    state: Arc<RwLock<ConnectionState>>,
}

impl RealtimeClient {
    pub async fn connect(url: &str) -> Result<Self, RealtimeError> {
        Self::with_config(url, ClientConfig::default()).await
    }

    /// Connect and spawn the reader and writer tasks.
    pub async fn with_config(url: &str, config: ClientConfig) -> Result<Self, RealtimeError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Outgoing>(config.outbound_queue);
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
        let state = Arc::new(RwLock::new(ConnectionState::Connected));

        // Writer task: forward outgoing queue to WebSocket
        tokio::spawn(async move {
            while let Some(outgoing) = out_rx.recv().await {
                let message = match outgoing {
                    Outgoing::Frame(bytes) => Message::Binary(bytes.into()),
                    Outgoing::Close => {
                        let _ = ws_writer.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = ws_writer.send(message).await {
                    log::warn!("WebSocket write failed: {e}");
                    break;
                }
            }
        });

        // Reader task: route incoming frames by topic
        let reader_routes = routes.clone();
        let reader_state = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match Frame::decode(&data) {
                        Ok(frame) => route(&reader_routes, frame).await,
                        Err(e) => log::warn!("Dropping undecodable frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *reader_state.write().await = ConnectionState::Disconnected;
            let senders: Vec<_> = reader_routes.write().await.drain().map(|(_, s)| s).collect();
            for sender in senders {
                let _ = sender.send(Inbound::Closed).await;
            }
            log::info!("Realtime connection closed");
        });

        log::info!("Connected to realtime server at {url}");
        Ok(Self {
            config,
            outgoing: out_tx,
            routes,
            state,
        })
    }

    /// Open the channel for `topic`. Does not subscribe yet.
    pub async fn channel(
        &self,
        topic: impl Into<String>,
        options: ChannelOptions,
    ) -> Result<Channel, RealtimeError> {
        let topic = topic.into();
        if *self.state.read().await == ConnectionState::Disconnected {
            return Err(RealtimeError::ConnectionClosed);
        }

        let mut routes = self.routes.write().await;
        if routes.get(&topic).is_some_and(|sender| !sender.is_closed()) {
            return Err(RealtimeError::ChannelAlreadyOpen(topic));
        }

        let (tx, rx) = mpsc::channel(self.config.event_queue);
        routes.insert(topic.clone(), tx.clone());

        let tracker = PresenceTracker::new(
            options.presence.as_ref().and_then(|p| p.identity.clone()),
            options.presence.as_ref().is_some_and(|p| p.cursors),
        );

        Ok(Channel {
            topic,
            options,
            outgoing: self.outgoing.clone(),
            routes: self.routes.clone(),
            route: tx,
            events: rx,
            pending: VecDeque::new(),
            tracker,
            conn_id: None,
            lifecycle: Lifecycle::Idle,
        })
    }

    /// Close the socket. Open channels receive `Closed`.
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        self.outgoing
            .send(Outgoing::Close)
            .await
            .map_err(|_| RealtimeError::ConnectionClosed)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }
}

async fn route(routes: &Routes, frame: Frame) {
    let sender = routes.read().await.get(&frame.topic).cloned();
    let Some(sender) = sender else {
        log::trace!("No channel for {:?} frame on '{}'", frame.kind, frame.topic);
        return;
    };
    let topic = frame.topic.clone();
    let kind = frame.kind;
    match sender.try_send(Inbound::Frame(frame)) {
        Ok(()) => {}
        // A channel nobody reads must not stall the others on this socket
        Err(mpsc::error::TrySendError::Full(_)) => {
            log::warn!("Channel '{topic}' is full; dropping {kind:?} frame");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            let mut routes = routes.write().await;
            if routes.get(&topic).is_some_and(|s| s.same_channel(&sender)) {
                routes.remove(&topic);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Subscribed,
    Closed,
}

/// A logical channel: one topic on one connection.
pub struct Channel {
    topic: String,
    options: ChannelOptions,
    outgoing: mpsc::Sender<Outgoing>,
    routes: Routes,
    route: mpsc::Sender<Inbound>,
    events: mpsc::Receiver<Inbound>,
    /// Events decoded but not yet handed out (a diff yields several).
    pending: VecDeque<ChannelEvent>,
    tracker: PresenceTracker,
    conn_id: Option<Uuid>,
    lifecycle: Lifecycle,
}

impl Channel {
    /// Send `Subscribe`. Calling it again while subscribed does nothing.
    pub async fn subscribe(&mut self) -> Result<(), RealtimeError> {
        match self.lifecycle {
            Lifecycle::Subscribed => return Ok(()),
            Lifecycle::Closed => return Err(RealtimeError::ChannelClosed(self.topic.clone())),
            Lifecycle::Idle => {}
        }

        let options = SubscribeOptions {
            presence_key: self.options.presence_key(),
            receive_own: self.options.receive_own,
        };
        let frame = Frame::subscribe(Uuid::nil(), self.topic.clone(), &options)?;
        self.send_frame(&frame).await?;
        self.tracker.begin_subscribe();
        self.lifecycle = Lifecycle::Subscribed;
        log::debug!("Subscribing to '{}'", self.topic);
        Ok(())
    }

    /// Next event, or `None` once the channel is torn down.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.lifecycle == Lifecycle::Closed {
                return None;
            }

            match self.events.recv().await {
                Some(Inbound::Frame(frame)) => self.handle(frame).await,
                Some(Inbound::Closed) | None => {
                    self.tracker.on_disconnected();
                    self.lifecycle = Lifecycle::Closed;
                    return Some(ChannelEvent::Closed);
                }
            }
        }
    }

    async fn handle(&mut self, frame: Frame) {
        match frame.kind {
            FrameKind::Subscribed => {
                self.conn_id = Some(frame.conn_id);
                if let Some(record) = self.tracker.on_subscribed() {
                    if let Err(e) = self.send_track(&record).await {
                        log::warn!("Initial track on '{}' failed: {e}", self.topic);
                    }
                }
                self.pending.push_back(ChannelEvent::Subscribed);
            }

            FrameKind::PresenceState => match frame.presence_snapshot() {
                Ok(snapshot) => {
                    if self.tracker.on_sync(snapshot.clone()) {
                        self.pending.push_back(ChannelEvent::PresenceSync(snapshot));
                    }
                }
                Err(e) => log::warn!("Bad presence snapshot on '{}': {e}", self.topic),
            },

            FrameKind::PresenceDiff => match frame.diff() {
                Ok(diff) => {
                    for (key, record) in diff.joins {
                        if self.tracker.on_join(&key, record.clone()) {
                            self.pending.push_back(ChannelEvent::PresenceJoin { key, record });
                        }
                    }
                    for (key, record) in diff.leaves {
                        if self.tracker.on_leave(&key) {
                            self.pending.push_back(ChannelEvent::PresenceLeave { key, record });
                        }
                    }
                }
                Err(e) => log::warn!("Bad presence diff on '{}': {e}", self.topic),
            },

            FrameKind::Broadcast => match frame.broadcast_event() {
                Ok(BroadcastEvent::Unknown) => {
                    log::debug!("Ignoring unknown broadcast on '{}'", self.topic);
                }
                Ok(event) => self.pending.push_back(ChannelEvent::Broadcast(event)),
                Err(e) => log::debug!("Ignoring undecodable broadcast on '{}': {e}", self.topic),
            },

            FrameKind::RowChange => match frame.change() {
                Ok(change) => self.pending.push_back(ChannelEvent::RowChange(change)),
                Err(e) => log::warn!("Bad row change on '{}': {e}", self.topic),
            },

            FrameKind::Error => {
                let message = frame.error_message().unwrap_or_default();
                log::warn!("Server error on '{}': {message}", self.topic);
                self.pending.push_back(ChannelEvent::Error(message));
            }

            other => log::trace!("Unhandled {other:?} frame on '{}'", self.topic),
        }
    }

    /// Fire-and-forget broadcast to the other subscribers.
    pub async fn send(&self, event: &BroadcastEvent) -> Result<(), RealtimeError> {
        self.ensure_subscribed()?;
        let frame = Frame::broadcast(self.frame_conn_id(), self.topic.clone(), event)?;
        self.send_frame(&frame).await
    }

    /// Publish `record` as this side's presence.
    pub async fn track(&mut self, record: PresenceRecord) -> Result<(), RealtimeError> {
        self.ensure_subscribed()?;
        self.send_track(&record).await?;
        self.tracker.set_local(record);
        Ok(())
    }

    pub async fn untrack(&mut self) -> Result<(), RealtimeError> {
        self.ensure_subscribed()?;
        let frame = Frame::untrack(self.frame_conn_id(), self.topic.clone());
        self.send_frame(&frame).await?;
        self.tracker.clear_local();
        Ok(())
    }

    /// Re-publish the local record with a new cursor.
    ///
    /// Returns `false` when cursors are off or nothing is tracked yet.
    pub async fn update_cursor(&mut self, x: f32, y: f32) -> Result<bool, RealtimeError> {
        self.ensure_subscribed()?;
        match self.tracker.update_cursor(x, y) {
            Some(record) => {
                self.send_track(&record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Leave the topic. Later calls are no-ops.
    pub async fn unsubscribe(&mut self) -> Result<(), RealtimeError> {
        let was_subscribed = self.lifecycle == Lifecycle::Subscribed;
        if self.lifecycle == Lifecycle::Closed {
            return Ok(());
        }
        self.lifecycle = Lifecycle::Closed;
        self.tracker.on_disconnected();
        self.pending.clear();

        {
            let mut routes = self.routes.write().await;
            if routes.get(&self.topic).is_some_and(|s| s.same_channel(&self.route)) {
                routes.remove(&self.topic);
            }
        }

        if was_subscribed {
            let frame = Frame::unsubscribe(self.frame_conn_id(), self.topic.clone());
            self.send_frame(&frame).await?;
            log::debug!("Unsubscribed from '{}'", self.topic);
        }
        Ok(())
    }

    pub fn presence(&self) -> &PresenceState {
        self.tracker.state()
    }

    pub fn phase(&self) -> PresencePhase {
        self.tracker.phase()
    }

    pub fn local_record(&self) -> Option<&PresenceRecord> {
        self.tracker.local_record()
    }

    /// Server-assigned connection id, known once subscribed.
    pub fn conn_id(&self) -> Option<Uuid> {
        self.conn_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn ensure_subscribed(&self) -> Result<(), RealtimeError> {
        match self.lifecycle {
            Lifecycle::Subscribed => Ok(()),
            Lifecycle::Idle => Err(RealtimeError::NotSubscribed(self.topic.clone())),
            Lifecycle::Closed => Err(RealtimeError::ChannelClosed(self.topic.clone())),
        }
    }

    fn frame_conn_id(&self) -> Uuid {
        self.conn_id.unwrap_or_else(Uuid::nil)
    }

    async fn send_track(&self, record: &PresenceRecord) -> Result<(), RealtimeError> {
        let frame = Frame::track(self.frame_conn_id(), self.topic.clone(), record)?;
        self.send_frame(&frame).await
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), RealtimeError> {
        let encoded = frame.encode()?;
        self.outgoing
            .send(Outgoing::Frame(encoded))
            .await
            .map_err(|_| RealtimeError::ConnectionClosed)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.lifecycle != Lifecycle::Subscribed {
            return;
        }
        match Frame::unsubscribe(self.frame_conn_id(), self.topic.clone()).encode() {
            Ok(encoded) => {
                if self.outgoing.try_send(Outgoing::Frame(encoded)).is_err() {
                    log::debug!("Could not queue unsubscribe for '{}' on drop", self.topic);
                }
            }
            Err(e) => log::debug!("Could not encode unsubscribe for '{}': {e}", self.topic),
        }
        if let Ok(mut routes) = self.routes.try_write() {
            if routes.get(&self.topic).is_some_and(|s| s.same_channel(&self.route)) {
                routes.remove(&self.topic);
            }
        }
    }
}
