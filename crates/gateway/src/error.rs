//! Request failures and their dialect-specific envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use toolrelay_core::{CredentialError, ProviderError};

/// Which client dialect a failure is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Messages,
    ChatCompletions,
}

/// Why a relayed request could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("No usable credential available. Add and verify one with `toolrelay tokens add`.")]
    NoCredential,

    #[error("Credential store failure: {0}")]
    Store(#[from] CredentialError),

    #[error("Upstream call failed: {0}")]
    Upstream(#[from] ProviderError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NoCredential => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// The error `type` both dialects report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::NoCredential => "authentication_error",
            Self::Store(_) | Self::Upstream(_) => "api_error",
        }
    }

    /// The chat-completions `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NoCredential => "invalid_api_key",
            Self::Store(_) => "internal_error",
            Self::Upstream(_) => "upstream_error",
        }
    }
}

/// A [`RelayError`] bound to the dialect it must be rendered in.
#[derive(Debug)]
pub struct GatewayError {
    pub dialect: Dialect,
    pub error: RelayError,
}

impl GatewayError {
    pub fn messages(error: impl Into<RelayError>) -> Self {
        Self {
            dialect: Dialect::Messages,
            error: error.into(),
        }
    }

    pub fn chat_completions(error: impl Into<RelayError>) -> Self {
        Self {
            dialect: Dialect::ChatCompletions,
            error: error.into(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let message = self.error.to_string();
        match self.dialect {
            Dialect::Messages => (
                status,
                Json(toolrelay_protocol::messages::ErrorEnvelope::new(self.error.kind(), message)),
            )
                .into_response(),
            Dialect::ChatCompletions => (
                status,
                Json(toolrelay_protocol::chat_completions::ErrorEnvelope::new(
                    self.error.kind(),
                    self.error.code(),
                    message,
                )),
            )
                .into_response(),
        }
    }
}

/// Decode a request body, reporting failures as invalid requests.
pub fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::InvalidRequest(format!("Invalid request body: {e}")))
}
