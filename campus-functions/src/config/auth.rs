//! Bearer token configuration

use serde::Deserialize;
use std::collections::HashMap;

use super::error::ValidationError;

/// Static bearer tokens accepted by the auth adapter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Comma-separated `token=user_id` pairs
    #[serde(default)]
    pub tokens: String,
}

impl AuthConfig {
    /// Parse `tokens` into a token → user id table.
    pub fn token_table(&self) -> Result<HashMap<String, String>, ValidationError> {
        let mut table = HashMap::new();
        for entry in self.tokens.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((token, user)) if !token.trim().is_empty() && !user.trim().is_empty() => {
                    table.insert(token.trim().to_string(), user.trim().to_string());
                }
                _ => return Err(ValidationError::InvalidTokenEntry(entry.to_string())),
            }
        }
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.token_table().map(|_| ())
    }
}
