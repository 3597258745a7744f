//! Row-change publication port.
//!
//! Handlers announce every notification insert/update so subscribed clients
//! see it on their `notifications:<user_id>` topic. Publication is best
//! effort: a failed publish is logged and never fails the request.

use async_trait::async_trait;
use campus_realtime::{notification_topic, ChangeKind, Hub, RowChange, NOTIFICATIONS_TABLE};
use std::sync::{Arc, Mutex};

use crate::store::NotificationRecord;

#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn publish(&self, topic: &str, change: RowChange);
}

#[async_trait]
impl ChangeNotifier for Hub {
    async fn publish(&self, topic: &str, change: RowChange) {
        match self.publish_change(topic, &change).await {
            Ok(delivered) => log::debug!(
                "Published {:?} on {topic} to {delivered} subscriber(s)",
                change.event
            ),
            Err(e) => log::warn!("Failed to publish row change on {topic}: {e}"),
        }
    }
}

/// Records publications instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(String, RowChange)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, RowChange)> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    async fn publish(&self, topic: &str, change: RowChange) {
        if let Ok(mut published) = self.published.lock() {
            published.push((topic.to_string(), change));
        }
    }
}

/// Publish a notification row on its recipient's topic.
pub async fn announce_notification(
    notifier: &Arc<dyn ChangeNotifier>,
    event: ChangeKind,
    record: &NotificationRecord,
) {
    match serde_json::to_value(record) {
        Ok(value) => {
            let change = RowChange::new(NOTIFICATIONS_TABLE, event, value);
            notifier
                .publish(&notification_topic(&record.user_id), change)
                .await;
        }
        Err(e) => log::warn!("Could not encode notification {}: {e}", record.id),
    }
}
