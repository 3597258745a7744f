//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Realtime broadcast capacity must be greater than zero")]
    InvalidBroadcastCapacity,

    #[error("Realtime outbound queue must be greater than zero")]
    InvalidOutboundQueue,

    #[error("Malformed auth token entry: {0}")]
    InvalidTokenEntry(String),

    #[error("Invalid URL for {0}")]
    InvalidUrl(&'static str),

    #[error("Invalid Stripe API key format")]
    InvalidStripeKey,
}
