//! Error types for the tidal forecast path and their HTTP mapping.
//!
//! Only boundary validation (configuration writes, provider responses, cache
//! deletes) produces errors. The window math in [`crate::windows`] never does.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;

/// Errors surfaced by the forecast service and the HTTP layer.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Tidal mode enabled without GPS or threshold, or an invalid field on write
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query string or body that could not be parsed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown location identifier
    #[error("location not found: {0}")]
    NotFound(String),

    /// Provider unreachable, non-success status, or malformed response
    #[error("tide provider error: {0}")]
    UpstreamProvider(String),

    /// Provider answered but with too few samples to interpolate
    #[error("tide provider returned {received} usable samples, need at least 2")]
    InsufficientData { received: usize },

    /// Admin endpoint called without a valid token
    #[error("unauthorized")]
    Unauthorized,

    /// Cache store failed where a stale entry would be a correctness bug
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ForecastError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamProvider(message.into())
    }

    /// True for failures the caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamProvider(_) | Self::InsufficientData { .. } | Self::Cache(_)
        )
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Configuration(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIGURATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::UpstreamProvider(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_PROVIDER_ERROR"),
            Self::InsufficientData { .. } => (StatusCode::BAD_GATEWAY, "INSUFFICIENT_DATA"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Cache(_) => (StatusCode::SERVICE_UNAVAILABLE, "CACHE_ERROR"),
        }
    }
}

impl From<QueryRejection> for ForecastError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ForecastError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for ForecastError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
        };
        (status, Json(body)).into_response()
    }
}
