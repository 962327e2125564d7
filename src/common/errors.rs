//! Caller-visible error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::session::Phase;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session is not ready")]
    NotReady,

    #[error("recipient must have at least 10 digits")]
    InvalidRecipient,

    #[error("no login code available (state: {0})")]
    NoArtifactAvailable(Phase),

    #[error("session already authenticated")]
    AlreadyAuthenticated,

    #[error("send failed: {0}")]
    SendFailed(#[source] TransportError),

    #[error("logout failed: {0}")]
    LogoutFailed(#[source] TransportError),

    #[error("rate limit exceeded")]
    RateLimited,
}

impl BridgeError {
    /// Machine-readable code placed in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "NOT_LOGGED",
            Self::InvalidRecipient => "INVALID_TO",
            Self::NoArtifactAvailable(_) => "NO_QR_AVAILABLE",
            Self::AlreadyAuthenticated => "ALREADY_LOGGED",
            Self::SendFailed(_) => "SEND_FAILED",
            Self::LogoutFailed(_) => "LOGOUT_FAILED",
            Self::RateLimited => "RATE_LIMITED",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotReady | Self::InvalidRecipient => StatusCode::BAD_REQUEST,
            // "not yet" answers, polled by clients
            Self::NoArtifactAvailable(_) | Self::AlreadyAuthenticated => StatusCode::OK,
            Self::SendFailed(_) | Self::LogoutFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        // transport details stay in the logs
        let body = match &self {
            Self::NoArtifactAvailable(phase) => json!({
                "ok": false,
                "error": self.code(),
                "state": phase,
            }),
            _ => json!({ "ok": false, "error": self.code() }),
        };

        (self.status_code(), Json(body)).into_response()
    }
}
