//! Stripe Checkout adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{upstream_error, CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::error::FunctionError;

pub struct StripeGateway {
    client: Client,
    api_key: String,
    base_url: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            currency: currency.into(),
        }
    }

    fn form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.user_id.clone()),
            ("metadata[user_id]", request.user_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
        ]
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, FunctionError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&self.form(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("Stripe", response).await);
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|e| FunctionError::Unknown(format!("Failed to parse Stripe response: {e}")))?;
        let Some(url) = session.url else {
            return Err(FunctionError::Unknown(format!(
                "Stripe session {} has no checkout URL",
                session.id
            )));
        };

        log::info!("Created checkout session {} for {}", session.id, request.user_id);
        Ok(CheckoutSession { id: session.id, url })
    }
}
