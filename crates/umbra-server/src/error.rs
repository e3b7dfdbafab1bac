use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the handshake controller (C6) and its supporting
/// collaborators. Each variant carries its own HTTP mapping so handlers
/// can return `Result<_, HandshakeError>` directly.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("malformed base64url field: {0}")]
    BadEncoding(&'static str),

    #[error("client public key was not a valid point")]
    BadClientKey,

    #[error("client signature did not verify")]
    BadSignature,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Core(#[from] umbra_core::CoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            HandshakeError::BadEncoding(_) | HandshakeError::BadClientKey => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            HandshakeError::BadSignature => {
                (StatusCode::UNAUTHORIZED, json!({ "error": self.to_string() }))
            }
            HandshakeError::RateLimited { retry_after_secs } => {
                let body = json!({ "error": self.to_string(), "retry_after_secs": retry_after_secs });
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("Retry-After", retry_after_secs.to_string())],
                    Json(body),
                )
                    .into_response();
            }
            HandshakeError::Core(_) | HandshakeError::Internal(_) => {
                tracing::error!(error = %self, "internal handshake failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
