//! Handler error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Errors a handler can return.
///
/// Every variant becomes a JSON body `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The AI completion gateway answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unknown(String),
}

impl FunctionError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Only rate limiting and payment-required keep their upstream status.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream { status: 429, .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status: 402, .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Upstream { .. } | Self::Store(_) | Self::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for FunctionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Unknown(format!("HTTP request failed: {e}"))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for FunctionError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::warn!("{self}");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
