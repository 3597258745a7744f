//! Request → response functions behind the HTTP routes.
//!
//! Handlers receive an already authenticated caller and the ports they need.
//! They never touch headers or status codes; errors are `FunctionError`s
//! that the HTTP layer renders.

pub mod achievements;
pub mod ai;
pub mod certificates;
pub mod checkout;
pub mod notifications;
pub mod video;

pub use achievements::{check_achievements, ActivityEvent, CheckAchievementsResponse, ACHIEVEMENTS};
pub use ai::ai_complete;
pub use certificates::{
    certificate_hash, fingerprint, CertificateAction, CertificateHashRequest,
    CertificateHashResponse,
};
pub use checkout::{create_checkout, CreateCheckoutRequest, CreateCheckoutResponse};
pub use notifications::{
    list_notifications, mark_notification_read, send_notification, MarkReadRequest,
    NotificationList, SendNotificationRequest,
};
pub use video::{create_video_room, CreateRoomRequest, CreateRoomResponse};
