//! HTTP routes for the function handlers.
//!
//! Routes:
//! - `GET  /health`
//! - `POST /functions/check-achievements`
//! - `POST /functions/send-notification`
//! - `POST /functions/mark-notification-read`
//! - `GET  /functions/notifications`
//! - `POST /functions/certificate-hash`
//! - `POST /functions/create-checkout`
//! - `POST /functions/create-video-room`
//! - `POST /functions/ai-complete`
//!
//! Every route authenticates its caller from `Authorization: Bearer <token>`
//! except certificate verification.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::auth::{bearer_token, require_user, AuthProvider, AuthUser};
use crate::error::FunctionError;
use crate::gateways::{
    Completion, CompletionGateway, CompletionRequest, PaymentGateway, VideoRoomProvider,
};
use crate::handlers::{
    self, ActivityEvent, CertificateAction, CertificateHashRequest, CertificateHashResponse,
    CheckAchievementsResponse, CreateCheckoutRequest, CreateCheckoutResponse, CreateRoomRequest,
    CreateRoomResponse, MarkReadRequest, NotificationList, SendNotificationRequest,
};
use crate::notify::ChangeNotifier;
use crate::store::{NotificationRecord, Store};

/// Shared ports for every route.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub video: Arc<dyn VideoRoomProvider>,
    pub ai: Arc<dyn CompletionGateway>,
}

impl AppState {
    async fn caller(&self, headers: &HeaderMap) -> Result<AuthUser, FunctionError> {
        require_user(self.auth.as_ref(), bearer_token(headers)).await
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/functions/check-achievements", post(check_achievements))
        .route("/functions/send-notification", post(send_notification))
        .route("/functions/mark-notification-read", post(mark_notification_read))
        .route("/functions/notifications", get(list_notifications))
        .route("/functions/certificate-hash", post(certificate_hash))
        .route("/functions/create-checkout", post(create_checkout))
        .route("/functions/create-video-room", post(create_video_room))
        .route("/functions/ai-complete", post(ai_complete))
        .with_state(state)
}

/// Malformed bodies are validation errors, rendered like every other error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, FunctionError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| FunctionError::validation(rejection.body_text()))
}

async fn health() -> &'static str {
    "ok"
}

async fn check_achievements(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ActivityEvent>, JsonRejection>,
) -> Result<Json<CheckAchievementsResponse>, FunctionError> {
    let user = state.caller(&headers).await?;
    let event = body(payload)?;
    handlers::check_achievements(state.store.as_ref(), &state.notifier, &user, event)
        .await
        .map(Json)
}

async fn send_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SendNotificationRequest>, JsonRejection>,
) -> Result<Json<NotificationRecord>, FunctionError> {
    let user = state.caller(&headers).await?;
    let request = body(payload)?;
    handlers::send_notification(state.store.as_ref(), &state.notifier, &user, request)
        .await
        .map(Json)
}

async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MarkReadRequest>, JsonRejection>,
) -> Result<Json<NotificationRecord>, FunctionError> {
    let user = state.caller(&headers).await?;
    let request = body(payload)?;
    handlers::mark_notification_read(state.store.as_ref(), &state.notifier, &user, request)
        .await
        .map(Json)
}

async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NotificationList>, FunctionError> {
    let user = state.caller(&headers).await?;
    handlers::list_notifications(state.store.as_ref(), &user)
        .await
        .map(Json)
}

async fn certificate_hash(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CertificateHashRequest>, JsonRejection>,
) -> Result<Json<CertificateHashResponse>, FunctionError> {
    let request = body(payload)?;
    let caller = match request.action {
        CertificateAction::Register => Some(state.caller(&headers).await?),
        CertificateAction::Verify => None,
    };
    handlers::certificate_hash(state.store.as_ref(), caller.as_ref(), request)
        .await
        .map(Json)
}

async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<Json<CreateCheckoutResponse>, FunctionError> {
    let user = state.caller(&headers).await?;
    let request = body(payload)?;
    handlers::create_checkout(state.payments.as_ref(), &user, request)
        .await
        .map(Json)
}

async fn create_video_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<Json<CreateRoomResponse>, FunctionError> {
    let user = state.caller(&headers).await?;
    let request = body(payload)?;
    handlers::create_video_room(state.video.as_ref(), &user, request)
        .await
        .map(Json)
}

async fn ai_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Json<Completion>, FunctionError> {
    let user = state.caller(&headers).await?;
    let request = body(payload)?;
    handlers::ai_complete(state.ai.as_ref(), &user, request)
        .await
        .map(Json)
}
