//! Checkout session creation. Redirect handling and webhooks live elsewhere.

use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::FunctionError;
use crate::gateways::{CheckoutRequest, PaymentGateway};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateCheckoutRequest {
    pub amount_cents: i64,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCheckoutResponse {
    pub session_id: String,
    pub url: String,
}

pub async fn create_checkout(
    payments: &dyn PaymentGateway,
    user: &AuthUser,
    request: CreateCheckoutRequest,
) -> Result<CreateCheckoutResponse, FunctionError> {
    if request.amount_cents <= 0 {
        return Err(FunctionError::validation("amount_cents must be positive"));
    }
    if request.description.trim().is_empty() {
        return Err(FunctionError::validation("description is required"));
    }
    if request.success_url.is_empty() || request.cancel_url.is_empty() {
        return Err(FunctionError::validation(
            "success_url and cancel_url are required",
        ));
    }

    let session = payments
        .create_checkout_session(&CheckoutRequest {
            user_id: user.user_id.clone(),
            amount_cents: request.amount_cents,
            description: request.description,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
        })
        .await?;

    Ok(CreateCheckoutResponse {
        session_id: session.id,
        url: session.url,
    })
}
