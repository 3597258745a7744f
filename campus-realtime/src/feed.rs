//! Row-change feed consumers.

use std::collections::HashSet;

use crate::events::{ChangeKind, RowChange};

pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Topic carrying one user's notification row changes.
pub fn notification_topic(user_id: &str) -> String {
    format!("notifications:{user_id}")
}

/// Unread-notification counter driven by the `notifications` feed.
///
/// Rows are identified by their `id` field and considered unread while
/// `read` is `false`.
#[derive(Debug, Clone, Default)]
pub struct NotificationBadge {
    unread: HashSet<String>,
}

impl NotificationBadge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from already-fetched rows.
    pub fn seed<'a>(rows: impl IntoIterator<Item = &'a serde_json::Value>) -> Self {
        let mut badge = Self::new();
        for row in rows {
            badge.observe(ChangeKind::Insert, row);
        }
        badge
    }

    /// Apply a change. Returns `true` when the count moved.
    pub fn apply(&mut self, change: &RowChange) -> bool {
        if change.table != NOTIFICATIONS_TABLE {
            return false;
        }
        self.observe(change.event, &change.record)
    }

    fn observe(&mut self, event: ChangeKind, record: &serde_json::Value) -> bool {
        let Some(id) = record.get("id").and_then(|v| v.as_str()) else {
            log::debug!("Notification change without an id");
            return false;
        };
        let read = record.get("read").and_then(|v| v.as_bool()).unwrap_or(false);

        match event {
            ChangeKind::Insert | ChangeKind::Update if !read => self.unread.insert(id.to_string()),
            _ => self.unread.remove(id),
        }
    }

    pub fn unread(&self) -> usize {
        self.unread.len()
    }

    pub fn is_unread(&self, id: &str) -> bool {
        self.unread.contains(id)
    }
}
