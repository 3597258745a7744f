//! Topic rooms: fan-out plus authoritative presence.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each member gets an independent receiver that buffers up to `capacity`
//! envelopes; a member that falls further behind loses the oldest ones.
//!
//! Presence is last-writer-wins per presence key. A key is owned by the
//! connection that tracked it last; only the owner's untrack or disconnect
//! removes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::events::RowChange;
use crate::presence::{PresenceDiff, PresenceRecord};
use crate::protocol::Frame;

/// A pre-encoded frame plus the connection it came from.
///
/// `origin == None` for server-originated frames, which reach everyone.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Option<Uuid>,
    pub bytes: Arc<Vec<u8>>,
}

/// Statistics for monitoring room health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub active_members: usize,
    pub tracked_presences: usize,
}

/// A subscribed connection.
#[derive(Debug, Clone)]
pub struct Member {
    pub conn_id: Uuid,
    pub presence_key: String,
    pub receive_own: bool,
}

#[derive(Debug, Clone)]
struct Tracked {
    owner: Uuid,
    record: PresenceRecord,
}

/// One topic.
///
/// Lock order is always `members` before `presence`.
pub struct Room {
    topic: String,
    sender: broadcast::Sender<Envelope>,
    members: RwLock<HashMap<Uuid, Member>>,
    presence: RwLock<HashMap<String, Tracked>>,
    capacity: usize,
    messages_sent: AtomicU64,
}

impl Room {
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            topic: topic.into(),
            sender,
            members: RwLock::new(HashMap::new()),
            presence: RwLock::new(HashMap::new()),
            capacity,
            messages_sent: AtomicU64::new(0),
        }
    }

    /// Add a member. Returns its receiver.
    pub async fn join(&self, member: Member) -> broadcast::Receiver<Envelope> {
        let mut members = self.members.write().await;
        members.insert(member.conn_id, member);
        self.sender.subscribe()
    }

    /// Remove a member and anything it tracked.
    ///
    /// The resulting leave diff is already published to the room.
    pub async fn leave(&self, conn_id: &Uuid) -> Result<Option<PresenceDiff>, ProtocolError> {
        let member = {
            let mut members = self.members.write().await;
            members.remove(conn_id)
        };
        match member {
            Some(member) => self.drop_presence(&member).await,
            None => Ok(None),
        }
    }

    /// Publish `record` under the member's presence key.
    ///
    /// Returns `None` when `conn_id` is not a member.
    pub async fn track(
        &self,
        conn_id: &Uuid,
        record: PresenceRecord,
    ) -> Result<Option<PresenceDiff>, ProtocolError> {
        let key = {
            let members = self.members.read().await;
            match members.get(conn_id) {
                Some(member) => member.presence_key.clone(),
                None => return Ok(None),
            }
        };

        {
            let mut presence = self.presence.write().await;
            presence.insert(
                key.clone(),
                Tracked {
                    owner: *conn_id,
                    record: record.clone(),
                },
            );
        }

        let diff = PresenceDiff::join(key, record);
        self.publish(None, &Frame::presence_diff(&self.topic, &diff)?);
        Ok(Some(diff))
    }

    /// Withdraw the member's presence, if it owns its key.
    pub async fn untrack(&self, conn_id: &Uuid) -> Result<Option<PresenceDiff>, ProtocolError> {
        let member = {
            let members = self.members.read().await;
            members.get(conn_id).cloned()
        };
        match member {
            Some(member) => self.drop_presence(&member).await,
            None => Ok(None),
        }
    }

    async fn drop_presence(&self, member: &Member) -> Result<Option<PresenceDiff>, ProtocolError> {
        let removed = {
            let mut presence = self.presence.write().await;
            match presence.get(&member.presence_key) {
                Some(tracked) if tracked.owner == member.conn_id => {
                    presence.remove(&member.presence_key)
                }
                _ => None,
            }
        };

        let Some(tracked) = removed else {
            return Ok(None);
        };
        let diff = PresenceDiff::leave(member.presence_key.clone(), tracked.record);
        self.publish(None, &Frame::presence_diff(&self.topic, &diff)?);
        Ok(Some(diff))
    }

    /// Authoritative presence map.
    pub async fn presence_snapshot(&self) -> HashMap<String, PresenceRecord> {
        self.presence
            .read()
            .await
            .iter()
            .map(|(key, tracked)| (key.clone(), tracked.record.clone()))
            .collect()
    }

    /// Encode and fan out a frame.
    ///
    /// Returns the number of receivers. Zero receivers is not an error.
    pub fn publish(&self, origin: Option<Uuid>, frame: &Frame) -> usize {
        match frame.encode() {
            Ok(bytes) => self.publish_raw(Envelope {
                origin,
                bytes: Arc::new(bytes),
            }),
            Err(e) => {
                log::error!("Failed to encode {:?} frame for {}: {e}", frame.kind, self.topic);
                0
            }
        }
    }

    /// Fan out pre-encoded bytes (zero-copy fast path).
    pub fn publish_raw(&self, envelope: Envelope) -> usize {
        let count = self.sender.send(envelope).unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn has_member(&self, conn_id: &Uuid) -> bool {
        self.members.read().await.contains_key(conn_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        let active_members = self.members.read().await.len();
        let tracked_presences = self.presence.read().await.len();
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            active_members,
            tracked_presences,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps topics to rooms.
///
/// Shared between the WebSocket server and in-process publishers such as
/// the notification handlers.
pub struct Hub {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    default_capacity: usize,
}

impl Hub {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Add `member` to the room for `topic`, creating it if needed.
    ///
    /// Returns `None` when the room already holds `max_members`. The room map
    /// stays write-locked until the member is in, so `remove_if_empty` never
    /// drops a room someone is joining.
    pub async fn join(
        &self,
        topic: &str,
        member: Member,
        max_members: usize,
    ) -> Option<(Arc<Room>, broadcast::Receiver<Envelope>)> {
        let mut rooms = self.rooms.write().await;
        let room = match rooms.get(topic) {
            Some(room) => room.clone(),
            None if max_members == 0 => return None,
            None => {
                let room = Arc::new(Room::new(topic, self.default_capacity));
                rooms.insert(topic.to_string(), room.clone());
                room
            }
        };
        if room.member_count().await >= max_members {
            return None;
        }
        let rx = room.join(member).await;
        Some((room, rx))
    }

    pub async fn get(&self, topic: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(topic).cloned()
    }

    /// Remove a room with no members.
    pub async fn remove_if_empty(&self, topic: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(topic) {
            if room.member_count().await == 0 {
                rooms.remove(topic);
                log::debug!("Room {topic} removed (empty)");
                return true;
            }
        }
        false
    }

    /// Deliver a row change to everyone subscribed to `topic`.
    ///
    /// Nobody listening is fine; returns 0.
    pub async fn publish_change(&self, topic: &str, change: &RowChange) -> Result<usize, ProtocolError> {
        let Some(room) = self.get(topic).await else {
            log::trace!("No subscribers for {topic}; dropping {} change", change.table);
            return Ok(0);
        };
        let frame = Frame::row_change(topic, change)?;
        Ok(room.publish(None, &frame))
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_topics(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::protocol::FrameKind;

    fn member(key: &str) -> Member {
        Member {
            conn_id: Uuid::new_v4(),
            presence_key: key.to_string(),
            receive_own: false,
        }
    }

    fn decode(envelope: &Envelope) -> Frame {
        Frame::decode(&envelope.bytes).unwrap()
    }

    #[tokio::test]
    async fn test_join_leave_members() {
        let room = Room::new("room:1", 16);
        let alice = member("alice");
        let _rx = room.join(alice.clone()).await;
        assert_eq!(room.member_count().await, 1);
        assert!(room.has_member(&alice.conn_id).await);

        room.leave(&alice.conn_id).await.unwrap();
        assert_eq!(room.member_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_all_receivers() {
        let room = Room::new("room:1", 16);
        let mut rx1 = room.join(member("a")).await;
        let mut rx2 = room.join(member("b")).await;

        let origin = Uuid::new_v4();
        let count = room.publish(Some(origin), &Frame::ping(origin));
        assert_eq!(count, 2);

        // Origin filtering is the forwarder's job
        assert_eq!(rx1.recv().await.unwrap().origin, Some(origin));
        assert_eq!(rx2.recv().await.unwrap().origin, Some(origin));
    }

    #[tokio::test]
    async fn test_track_publishes_join_diff() {
        let room = Room::new("room:1", 16);
        let alice = member("u1");
        let mut rx = room.join(alice.clone()).await;

        let record = PresenceRecord::new("u1", "Ada", "#fff");
        let diff = room.track(&alice.conn_id, record.clone()).await.unwrap().unwrap();
        assert_eq!(diff.joins.get("u1"), Some(&record));

        let frame = decode(&rx.recv().await.unwrap());
        assert_eq!(frame.kind, FrameKind::PresenceDiff);
        assert_eq!(frame.diff().unwrap(), diff);
        assert_eq!(room.presence_snapshot().await.get("u1"), Some(&record));
    }

    #[tokio::test]
    async fn test_track_by_non_member_ignored() {
        let room = Room::new("room:1", 16);
        let result = room
            .track(&Uuid::new_v4(), PresenceRecord::new("x", "X", "#000"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(room.presence_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_removes_owned_presence() {
        let room = Room::new("room:1", 16);
        let alice = member("u1");
        let _rx = room.join(alice.clone()).await;
        room.track(&alice.conn_id, PresenceRecord::new("u1", "Ada", "#fff")).await.unwrap();

        let diff = room.leave(&alice.conn_id).await.unwrap().unwrap();
        assert!(diff.leaves.contains_key("u1"));
        assert!(room.presence_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_shared_key_last_writer_owns() {
        let room = Room::new("room:1", 16);
        let tab1 = member("u1");
        let tab2 = member("u1");
        let _rx1 = room.join(tab1.clone()).await;
        let _rx2 = room.join(tab2.clone()).await;

        room.track(&tab1.conn_id, PresenceRecord::new("u1", "Ada", "#111")).await.unwrap();
        room.track(&tab2.conn_id, PresenceRecord::new("u1", "Ada", "#222")).await.unwrap();

        // tab1 no longer owns the key
        assert!(room.leave(&tab1.conn_id).await.unwrap().is_none());
        assert_eq!(room.presence_snapshot().await.get("u1").unwrap().color, "#222");

        assert!(room.untrack(&tab2.conn_id).await.unwrap().is_some());
        assert!(room.presence_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_room_stats() {
        let room = Room::new("room:1", 16);
        let alice = member("a");
        let _rx = room.join(alice.clone()).await;
        room.publish(None, &Frame::pong(Uuid::nil()));
        room.track(&alice.conn_id, PresenceRecord::new("a", "A", "#1")).await.unwrap();

        let stats = room.stats().await;
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.active_members, 1);
        assert_eq!(stats.tracked_presences, 1);
        assert_eq!(room.capacity(), 16);
        assert_eq!(room.topic(), "room:1");
    }

    #[tokio::test]
    async fn test_hub_join_shares_room() {
        let hub = Hub::new(16);
        let (room1, _rx1) = hub.join("room:1", member("a"), 10).await.unwrap();
        let (room2, _rx2) = hub.join("room:1", member("b"), 10).await.unwrap();
        assert!(Arc::ptr_eq(&room1, &room2));
        assert_eq!(room1.member_count().await, 2);
        assert_eq!(hub.room_count().await, 1);
        assert_eq!(hub.active_topics().await, vec!["room:1".to_string()]);
    }

    #[tokio::test]
    async fn test_hub_cleanup() {
        let hub = Hub::new(16);
        let alice = member("a");
        let (room, _rx) = hub.join("room:1", alice.clone(), 10).await.unwrap();

        assert!(!hub.remove_if_empty("room:1").await);
        room.leave(&alice.conn_id).await.unwrap();
        assert!(hub.remove_if_empty("room:1").await);
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_hub_join_respects_capacity() {
        let hub = Hub::new(16);
        assert!(hub.join("room:1", member("a"), 1).await.is_some());
        assert!(hub.join("room:1", member("b"), 1).await.is_none());
        assert_eq!(hub.get("room:1").await.unwrap().member_count().await, 1);

        assert!(hub.join("room:2", member("c"), 0).await.is_none());
        assert!(hub.get("room:2").await.is_none());
    }

    #[tokio::test]
    async fn test_join_between_leave_and_cleanup_keeps_room() {
        let hub = Hub::new(16);
        let alice = member("a");
        let (room, _rx_a) = hub.join("notifications:u1", alice.clone(), 10).await.unwrap();

        // Alice leaves, Bob joins before her cleanup runs
        room.leave(&alice.conn_id).await.unwrap();
        let (bob_room, mut rx_b) = hub.join("notifications:u1", member("b"), 10).await.unwrap();
        assert!(!hub.remove_if_empty("notifications:u1").await);
        assert!(Arc::ptr_eq(&room, &bob_room));

        let change = RowChange::new("notifications", ChangeKind::Insert, serde_json::json!({"id": "n2"}));
        assert_eq!(hub.publish_change("notifications:u1", &change).await.unwrap(), 1);
        assert_eq!(decode(&rx_b.recv().await.unwrap()).change().unwrap(), change);
    }

    #[tokio::test]
    async fn test_publish_change_without_room() {
        let hub = Hub::new(16);
        let change = RowChange::new("notifications", ChangeKind::Insert, serde_json::json!({}));
        assert_eq!(hub.publish_change("notifications:nobody", &change).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_change_reaches_members() {
        let hub = Hub::new(16);
        let (_room, mut rx) = hub.join("notifications:u1", member("u1"), 10).await.unwrap();

        let change = RowChange::new("notifications", ChangeKind::Insert, serde_json::json!({"id": "n1"}));
        assert_eq!(hub.publish_change("notifications:u1", &change).await.unwrap(), 1);

        let envelope = rx.recv().await.unwrap();
        assert!(envelope.origin.is_none());
        assert_eq!(decode(&envelope).change().unwrap(), change);
    }
}
