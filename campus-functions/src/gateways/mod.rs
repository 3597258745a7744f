//! Third-party ports: payments, video rooms and LLM completions.
//!
//! Each port has one HTTP adapter plus [`Disabled`], which stands in when
//! the adapter's API key is not configured.

mod completion;
mod daily;
mod stripe;

pub use completion::HttpCompletionGateway;
pub use daily::DailyRoomProvider;
pub use stripe::StripeGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FunctionError;

// ─── Payments ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, FunctionError>;
}

// ─── Video rooms ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRoom {
    pub name: String,
    pub url: String,
}

#[async_trait]
pub trait VideoRoomProvider: Send + Sync {
    async fn create_room(&self, name: &str) -> Result<VideoRoom, FunctionError>;
}

// ─── Completions ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A function the model may call instead of answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Completion {
    Text { text: String },
    ToolCall { name: String, arguments: serde_json::Value },
}

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, FunctionError>;
}

// ─── Shared ───────────────────────────────────────────────────────

/// Status and a readable message for a non-success upstream response.
pub(crate) async fn upstream_failure(service: &str, response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = match status {
        429 => format!("{service} rate limit exceeded"),
        402 => format!("{service} requires payment"),
        500..=599 => format!("{service} unavailable: {body}"),
        _ => format!("{service} rejected the request: {body}"),
    };
    (status, message)
}

/// Non-success from a payment or video upstream. The caller always sees 500;
/// only the completion gateway passes its status through.
pub(crate) async fn upstream_error(service: &str, response: reqwest::Response) -> FunctionError {
    let (status, message) = upstream_failure(service, response).await;
    FunctionError::Unknown(format!("{message} (status {status})"))
}

/// Placeholder for a gateway without credentials.
#[derive(Debug, Clone, Copy)]
pub struct Disabled(pub &'static str);

impl Disabled {
    fn error(&self) -> FunctionError {
        FunctionError::Unknown(format!("{} is not configured", self.0))
    }
}

#[async_trait]
impl PaymentGateway for Disabled {
    async fn create_checkout_session(
        &self,
        _request: &CheckoutRequest,
    ) -> Result<CheckoutSession, FunctionError> {
        Err(self.error())
    }
}

#[async_trait]
impl VideoRoomProvider for Disabled {
    async fn create_room(&self, _name: &str) -> Result<VideoRoom, FunctionError> {
        Err(self.error())
    }
}

#[async_trait]
impl CompletionGateway for Disabled {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, FunctionError> {
        Err(self.error())
    }
}
