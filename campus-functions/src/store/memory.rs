//! In-process store for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AchievementRecord, ActivityCounts, ActivityKind, CertificateRecord, InsertOutcome,
    NotificationRecord, Store, StoreError,
};

#[derive(Default)]
pub struct MemoryStore {
    notifications: RwLock<HashMap<Uuid, NotificationRecord>>,
    /// Keyed by `(user_id, achievement_id)`
    achievements: RwLock<HashMap<(String, String), AchievementRecord>>,
    certificates: RwLock<HashMap<Uuid, CertificateRecord>>,
    activity: RwLock<HashMap<String, ActivityCounts>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        self.notifications
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let mut list: Vec<_> = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        let mut notifications = self.notifications.write().await;
        Ok(notifications
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn list_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<AchievementRecord>, StoreError> {
        let mut list: Vec<_> = self
            .achievements
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.earned_at.cmp(&b.earned_at));
        Ok(list)
    }

    async fn insert_achievement(
        &self,
        record: &AchievementRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let key = (record.user_id.clone(), record.achievement_id.clone());
        let mut achievements = self.achievements.write().await;
        if achievements.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        achievements.insert(key, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn activity_counts(&self, user_id: &str) -> Result<ActivityCounts, StoreError> {
        Ok(self
            .activity
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or_default())
    }

    async fn record_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
    ) -> Result<ActivityCounts, StoreError> {
        let mut activity = self.activity.write().await;
        let counts = activity.entry(user_id.to_string()).or_default();
        counts.bump(kind);
        Ok(*counts)
    }

    async fn issue_certificate(
        &self,
        record: &CertificateRecord,
    ) -> Result<CertificateRecord, StoreError> {
        let mut certificates = self.certificates.write().await;
        let existing = certificates
            .values()
            .find(|c| c.user_id == record.user_id && c.course_id == record.course_id);
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }
        certificates.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.certificates.read().await.get(&id).cloned())
    }

    async fn set_certificate_fingerprint(
        &self,
        id: Uuid,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        let mut certificates = self.certificates.write().await;
        Ok(certificates.get_mut(&id).map(|c| {
            c.blockchain_hash = Some(hash.to_string());
            c.blockchain_timestamp = Some(at);
            c.clone()
        }))
    }
}
