//! Application configuration
//!
//! Loaded from environment variables with the `CAMPUS` prefix; nested values
//! use `__` as separator. A `.env` file is honored during development.
//!
//! - `CAMPUS__SERVER__PORT=8080` -> `server.port = 8080`
//! - `CAMPUS__REALTIME__BIND_ADDR=0.0.0.0:4000` -> `realtime.bind_addr`
//! - `CAMPUS__STORE__PATH=/var/lib/campus` -> `store.path`
//! - `CAMPUS__AUTH__TOKENS=tok-a=u1,tok-b=u2` -> `auth.tokens`

mod auth;
mod error;
mod gateways;
mod http;
mod storage;

pub use auth::AuthConfig;
pub use error::{ConfigError, ValidationError};
pub use gateways::{AiConfig, PaymentConfig, VideoConfig};
pub use http::HttpConfig;
pub use storage::StorageConfig;

use campus_realtime::ServerConfig as RealtimeConfig;
use serde::Deserialize;

/// Root application configuration
///
/// Every section has usable defaults, so an empty environment yields a
/// local development setup: in-memory store, no gateways, no tokens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP listener for the function routes
    #[serde(default)]
    pub server: HttpConfig,

    /// WebSocket realtime server
    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub store: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub ai: AiConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value cannot be parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CAMPUS")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        validate_realtime(&self.realtime)?;
        self.auth.validate()?;
        self.payment.validate()?;
        self.video.validate()?;
        self.ai.validate()?;
        Ok(())
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_realtime(config: &RealtimeConfig) -> Result<(), ValidationError> {
    if config.bind_addr.trim().is_empty() {
        return Err(ValidationError::MissingRequired("realtime.bind_addr"));
    }
    // tokio broadcast channels cannot be created with zero capacity
    if config.broadcast_capacity == 0 {
        return Err(ValidationError::InvalidBroadcastCapacity);
    }
    if config.outbound_queue == 0 {
        return Err(ValidationError::InvalidOutboundQueue);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "CAMPUS__SERVER__PORT",
        "CAMPUS__REALTIME__BIND_ADDR",
        "CAMPUS__REALTIME__BROADCAST_CAPACITY",
        "CAMPUS__STORE__PATH",
        "CAMPUS__AUTH__TOKENS",
        "CAMPUS__PAYMENT__STRIPE_API_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let config = AppConfig::load().unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.realtime.bind_addr, "127.0.0.1:4000");
        assert!(config.store.path.is_none());
        assert!(config.payment.stripe_api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CAMPUS__SERVER__PORT", "9090");
        env::set_var("CAMPUS__REALTIME__BIND_ADDR", "0.0.0.0:4100");
        env::set_var("CAMPUS__STORE__PATH", "/tmp/campus-db");
        env::set_var("CAMPUS__AUTH__TOKENS", "tok-a=u1");
        env::set_var("CAMPUS__PAYMENT__STRIPE_API_KEY", "sk_test_xxx");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.realtime.bind_addr, "0.0.0.0:4100");
        assert_eq!(
            config.store.path.as_deref(),
            Some(std::path::Path::new("/tmp/campus-db"))
        );
        assert_eq!(config.auth.token_table().unwrap()["tok-a"], "u1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_broadcast_capacity_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CAMPUS__REALTIME__BROADCAST_CAPACITY", "0");
        let result = AppConfig::load_validated();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::ValidationFailed(ValidationError::InvalidBroadcastCapacity))
        ));
    }

    #[test]
    fn test_validate_realtime_bind_addr() {
        let mut config = AppConfig::default();
        config.realtime.bind_addr = " ".to_string();
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("realtime.bind_addr"))
        );
    }
}
