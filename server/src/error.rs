//! # Error Kinds
//!
//! Every way an in-flight request or a tunnel attach can fail, and the HTTP
//! status it surfaces as. Waiter-level failures never propagate past the
//! ingress handler as a process error — they are converted to a status code
//! here and nowhere else.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a credential presented on the WebSocket upgrade was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential was presented at all.
    Missing,
    /// The credential is malformed or its signature doesn't verify.
    Invalid,
    /// A signed token's `exp` claim has already elapsed.
    Expired,
    /// A signed token's `sub` claim doesn't match the URL's connection id.
    SubjectMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("waiter deadline elapsed")]
    Timeout,
    #[error("tunnel closed while a request was pending")]
    TunnelClosed,
    #[error("tunnel outbound queue is saturated")]
    TunnelSaturated,
    #[error("server is shutting down")]
    Shutdown,
    #[error("authentication failed: {0:?}")]
    AuthFailed(AuthFailure),
    #[error("connection id is malformed")]
    InvalidConnectionId,
    #[error("method is not in the allowed set")]
    MethodNotAllowed,
    #[error("a session is already attached to this connection id")]
    AlreadyAttached,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout | Self::Shutdown => StatusCode::GATEWAY_TIMEOUT,
            Self::TunnelClosed => StatusCode::BAD_GATEWAY,
            Self::TunnelSaturated => StatusCode::SERVICE_UNAVAILABLE,
            Self::AuthFailed(AuthFailure::SubjectMismatch) => StatusCode::FORBIDDEN,
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidConnectionId => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::AlreadyAttached => StatusCode::CONFLICT,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
