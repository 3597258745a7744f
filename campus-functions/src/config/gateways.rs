//! Third-party gateway configuration (payments, video rooms, completions)

use serde::Deserialize;

use super::error::ValidationError;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret key. Checkout is unavailable when unset.
    pub stripe_api_key: Option<String>,

    #[serde(default = "default_stripe_url")]
    pub base_url: String,

    /// ISO currency for checkout line items
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl PaymentConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(key) = &self.stripe_api_key {
            if !key.starts_with("sk_") {
                return Err(ValidationError::InvalidStripeKey);
            }
        }
        validate_url(&self.base_url, "payment.base_url")
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: None,
            base_url: default_stripe_url(),
            currency: default_currency(),
        }
    }
}

/// Video room configuration (Daily)
#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_daily_url")]
    pub base_url: String,

    /// Room lifetime in seconds
    #[serde(default = "default_room_ttl")]
    pub room_ttl_secs: i64,
}

impl VideoConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_url(&self.base_url, "video.base_url")
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_daily_url(),
            room_ttl_secs: default_room_ttl(),
        }
    }
}

/// Completion gateway configuration (OpenAI-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_ai_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,
}

impl AiConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_url(&self.base_url, "ai.base_url")
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_ai_url(),
            model: default_model(),
        }
    }
}

fn validate_url(url: &str, field: &'static str) -> Result<(), ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::InvalidUrl(field))
    }
}

fn default_stripe_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_daily_url() -> String {
    "https://api.daily.co/v1".to_string()
}

fn default_room_ttl() -> i64 {
    4 * 60 * 60
}

fn default_ai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_key_prefix() {
        let config = PaymentConfig {
            stripe_api_key: Some("pk_test_xxx".to_string()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidStripeKey));

        let config = PaymentConfig {
            stripe_api_key: Some("sk_test_xxx".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_base_url() {
        let config = AiConfig {
            base_url: "api.openai.com".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidUrl("ai.base_url")));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(PaymentConfig::default().validate().is_ok());
        assert!(VideoConfig::default().validate().is_ok());
        assert!(AiConfig::default().validate().is_ok());
    }
}
