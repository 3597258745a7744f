//! Caller identity port.
//!
//! Every handler except certificate verification authenticates its caller
//! first. The HTTP layer pulls the token from `Authorization: Bearer <token>`
//! and passes it down; handlers never see headers.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;

use crate::error::FunctionError;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Validates access tokens against the backing auth service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Unauthorized` when the token is unknown or rejected.
    async fn authenticate(&self, token: &str) -> Result<AuthUser, FunctionError>;
}

/// Fixed token table, loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuth {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuth {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn authenticate(&self, token: &str) -> Result<AuthUser, FunctionError> {
        self.tokens
            .get(token)
            .map(|user_id| AuthUser {
                user_id: user_id.clone(),
            })
            .ok_or_else(|| FunctionError::unauthorized("invalid token"))
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticate an optional token, treating absence as `Unauthorized`.
pub async fn require_user(
    auth: &dyn AuthProvider,
    token: Option<&str>,
) -> Result<AuthUser, FunctionError> {
    let token = token.ok_or_else(|| FunctionError::unauthorized("missing bearer token"))?;
    auth.authenticate(token).await
}
