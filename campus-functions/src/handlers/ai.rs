//! LLM completion pass-through.

use crate::auth::AuthUser;
use crate::error::FunctionError;
use crate::gateways::{Completion, CompletionGateway, CompletionRequest};

pub async fn ai_complete(
    gateway: &dyn CompletionGateway,
    user: &AuthUser,
    request: CompletionRequest,
) -> Result<Completion, FunctionError> {
    if request.messages.is_empty() {
        return Err(FunctionError::validation("messages must not be empty"));
    }
    if request.messages.iter().any(|m| m.role.trim().is_empty()) {
        return Err(FunctionError::validation("every message needs a role"));
    }

    log::debug!(
        "{} requested a completion ({} messages, {} tools)",
        user.user_id,
        request.messages.len(),
        request.tools.len()
    );
    gateway.complete(&request).await
}
