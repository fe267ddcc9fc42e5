//! Gateway errors and their HTTP rendering.
//!
//! Rate limiting is not in here: a rejection is a normal
//! `RateLimitResult`, rendered by `rate_limit::http::rejection`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Every upstream is currently marked unhealthy.
    #[error("no healthy upstream available")]
    NoHealthyUpstream,

    /// The upstream call failed at the transport level.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Route does not name a known endpoint class.
    #[error("{0}")]
    NotFound(String),

    /// Request body exceeded the configured maximum.
    #[error("request body too large")]
    BodyTooLarge,

    /// Startup configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    /// Error code (e.g. "bad_gateway", "service_unavailable").
    pub(crate) error: &'static str,
    pub(crate) detail: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            GatewayError::NoHealthyUpstream => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            GatewayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            GatewayError::BodyTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            GatewayError::InvalidConfig(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error,
            detail: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
