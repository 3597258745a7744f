//! Notification dispatch and read tracking.

use campus_realtime::ChangeKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::FunctionError;
use crate::notify::{announce_notification, ChangeNotifier};
use crate::store::{NotificationKind, NotificationRecord, Store};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SendNotificationRequest {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub link: Option<String>,
}

fn default_kind() -> NotificationKind {
    NotificationKind::Info
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkReadRequest {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationList {
    pub notifications: Vec<NotificationRecord>,
    pub unread: usize,
}

/// Insert a notification for `request.user_id` and push it to their feed.
pub async fn send_notification(
    store: &dyn Store,
    notifier: &Arc<dyn ChangeNotifier>,
    sender: &AuthUser,
    request: SendNotificationRequest,
) -> Result<NotificationRecord, FunctionError> {
    if request.user_id.trim().is_empty() {
        return Err(FunctionError::validation("user_id is required"));
    }
    if request.title.trim().is_empty() {
        return Err(FunctionError::validation("title is required"));
    }
    if request.message.trim().is_empty() {
        return Err(FunctionError::validation("message is required"));
    }

    let mut record =
        NotificationRecord::new(request.user_id, request.title, request.message, request.kind);
    record.link = request.link.filter(|l| !l.is_empty());

    store.insert_notification(&record).await?;
    log::info!(
        "{} sent {:?} notification {} to {}",
        sender.user_id,
        record.kind,
        record.id,
        record.user_id
    );
    announce_notification(notifier, ChangeKind::Insert, &record).await;
    Ok(record)
}

/// Only the recipient may mark a notification read.
pub async fn mark_notification_read(
    store: &dyn Store,
    notifier: &Arc<dyn ChangeNotifier>,
    user: &AuthUser,
    request: MarkReadRequest,
) -> Result<NotificationRecord, FunctionError> {
    let record = store
        .mark_notification_read(&user.user_id, request.id)
        .await?
        .ok_or_else(|| FunctionError::not_found(format!("notification {}", request.id)))?;
    announce_notification(notifier, ChangeKind::Update, &record).await;
    Ok(record)
}

pub async fn list_notifications(
    store: &dyn Store,
    user: &AuthUser,
) -> Result<NotificationList, FunctionError> {
    let notifications = store.list_notifications(&user.user_id).await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(NotificationList {
        notifications,
        unread,
    })
}
