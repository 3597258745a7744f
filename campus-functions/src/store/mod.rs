//! Row store port and its adapters.
//!
//! ```text
//! ┌──────────────┐   Store trait    ┌──────────────┐
//! │  handlers    │ ───────────────► │ MemoryStore  │  tests / local dev
//! │              │                  ├──────────────┤
//! │              │                  │ RocksStore   │  column families:
//! └──────────────┘                  └──────────────┘  notifications,
//!                                                     achievements,
//!                                                     certificates, activity
//! ```
//!
//! Achievement rows are unique on `(user_id, achievement_id)`. Both adapters
//! enforce that on insert and report [`InsertOutcome::AlreadyExists`] instead
//! of writing a duplicate.

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::{RocksStore, RocksStoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Achievement,
    Course,
    Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// New unread notification stamped with the current time.
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            kind,
            read: false,
            link: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementRecord {
    pub id: Uuid,
    pub user_id: String,
    pub achievement_id: String,
    pub title: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub issued_at: DateTime<Utc>,
    pub verification_code: String,
    /// Hex SHA-256 fingerprint, set by `register`
    pub blockchain_hash: Option<String>,
    /// Wall-clock time of the last `register`
    pub blockchain_timestamp: Option<DateTime<Utc>>,
}

impl CertificateRecord {
    pub fn new(
        user_id: impl Into<String>,
        course_id: impl Into<String>,
        verification_code: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            course_id: course_id.into(),
            issued_at: Utc::now(),
            verification_code: verification_code.into(),
            blockchain_hash: None,
            blockchain_timestamp: None,
        }
    }
}

/// Per-user progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub lessons_completed: u32,
    pub courses_completed: u32,
    pub quizzes_completed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Lesson,
    Course,
    Quiz,
}

impl ActivityCounts {
    pub fn bump(&mut self, kind: ActivityKind) {
        match kind {
            ActivityKind::Lesson => self.lessons_completed += 1,
            ActivityKind::Course => self.courses_completed += 1,
            ActivityKind::Quiz => self.quizzes_completed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Relational store the handlers read and write.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_notifications(&self, user_id: &str)
        -> Result<Vec<NotificationRecord>, StoreError>;

    /// Sets `read` on a notification owned by `user_id`. `None` when the
    /// notification does not exist for that user.
    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<NotificationRecord>, StoreError>;

    async fn list_achievements(&self, user_id: &str)
        -> Result<Vec<AchievementRecord>, StoreError>;

    async fn insert_achievement(
        &self,
        record: &AchievementRecord,
    ) -> Result<InsertOutcome, StoreError>;

    async fn activity_counts(&self, user_id: &str) -> Result<ActivityCounts, StoreError>;

    /// Increment one counter and return the new totals.
    async fn record_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
    ) -> Result<ActivityCounts, StoreError>;

    /// Insert `record` unless its user already holds a certificate for the
    /// same course. Returns whichever certificate is stored.
    async fn issue_certificate(
        &self,
        record: &CertificateRecord,
    ) -> Result<CertificateRecord, StoreError>;

    async fn get_certificate(&self, id: Uuid) -> Result<Option<CertificateRecord>, StoreError>;

    /// Store the fingerprint and its timestamp. `None` for unknown ids.
    async fn set_certificate_fingerprint(
        &self,
        id: Uuid,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_bump() {
        let mut counts = ActivityCounts::default();
        counts.bump(ActivityKind::Lesson);
        counts.bump(ActivityKind::Lesson);
        counts.bump(ActivityKind::Quiz);
        assert_eq!(counts.lessons_completed, 2);
        assert_eq!(counts.quizzes_completed, 1);
        assert_eq!(counts.courses_completed, 0);
    }

    #[test]
    fn test_notification_json_shape() {
        let record = NotificationRecord::new("u1", "Hi", "Welcome", NotificationKind::Course)
            .with_link("/courses/1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "course");
        assert_eq!(json["read"], false);
        assert_eq!(json["link"], "/courses/1");
    }
}
