// ============================================================================
// Gateway Error Type
// ============================================================================
//
// One error enum for the whole request plane, mapped onto the HTTP surface:
// - AuthMissing/AuthInvalid          -> 401
// - PermissionDenied                 -> 403
// - ServiceNotFound                  -> 404
// - RateLimited                      -> 429
// - BadRequest                       -> 400
// - UpstreamUnavailable              -> 502
// - UpstreamTimeout                  -> 504
// - ChainUnavailable                 -> 503
// - ConfigMissing/Chain/Internal/... -> 500
//
// ============================================================================

use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request-plane error with a stable code and user-facing mapping
#[derive(Error, Debug)]
pub enum GatewayError {
    // ===== Authentication & Authorization =====
    #[error("authentication required")]
    AuthMissing,

    #[error("authentication failed: {0}")]
    AuthInvalid(String),

    #[error("insufficient permissions: {0}")]
    PermissionDenied(String),

    // ===== Routing & Proxying =====
    #[error("service not found")]
    ServiceNotFound,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("rate limit exceeded")]
    RateLimited { rps: u32 },

    // ===== Client Input =====
    #[error("bad request: {0}")]
    BadRequest(String),

    // ===== Blockchain =====
    #[error("contract not configured: {0}")]
    ConfigMissing(String),

    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("chain error: {0}")]
    Chain(String),

    // ===== Infrastructure =====
    #[error("registry error: {0}")]
    Registry(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthMissing | GatewayError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
            GatewayError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::ServiceNotFound => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ChainUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ConfigMissing(_)
            | GatewayError::Chain(_)
            | GatewayError::Registry(_)
            | GatewayError::Json(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for logs and programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::AuthMissing => "AUTH_REQUIRED",
            GatewayError::AuthInvalid(_) => "AUTH_INVALID",
            GatewayError::PermissionDenied(_) => "PERMISSION_DENIED",
            GatewayError::ServiceNotFound => "SERVICE_NOT_FOUND",
            GatewayError::RateLimited { .. } => "RATE_LIMITED",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            GatewayError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            GatewayError::ConfigMissing(_) => "CONTRACT_NOT_CONFIGURED",
            GatewayError::ChainUnavailable(_) => "CHAIN_UNAVAILABLE",
            GatewayError::Chain(_) => "CHAIN_ERROR",
            GatewayError::Registry(_) => "REGISTRY_ERROR",
            GatewayError::Json(_) => "JSON_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The wire body for this error: `{"error": ..}` plus an optional
    /// human-readable `message` field where the API documents one.
    fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::AuthMissing => json!({
                "error": "authentication required",
                "message": "valid JWT token or API key required",
            }),
            GatewayError::AuthInvalid(reason) => json!({
                "error": "authentication failed",
                "message": reason,
            }),
            GatewayError::PermissionDenied(reason) => json!({
                "error": "insufficient permissions",
                "message": reason,
            }),
            GatewayError::ServiceNotFound => json!({ "error": "Service not found" }),
            GatewayError::RateLimited { rps } => json!({
                "error": "rate limit exceeded",
                "message": format!("rate limit: {} requests per second", rps),
            }),
            GatewayError::BadRequest(reason) => json!({ "error": reason }),
            GatewayError::UpstreamUnavailable(cause) => json!({
                "error": format!("Service unavailable: {}", cause),
            }),
            GatewayError::UpstreamTimeout(_) => json!({ "error": "upstream timeout" }),
            GatewayError::ChainUnavailable(_) => json!({
                "error": "Blockchain gateway not available",
            }),
            // Server-side details stay out of the response body
            GatewayError::ConfigMissing(_)
            | GatewayError::Chain(_)
            | GatewayError::Registry(_)
            | GatewayError::Json(_)
            | GatewayError::Internal(_) => json!({
                "error": "Internal server error",
                "error_code": self.error_code(),
            }),
        }
    }

    /// Log with a level matching the failure class
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = %self, error_code = %code, status = %status.as_u16(), "Request failed");
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(error = %self, error_code = %code, "Request rejected");
        } else {
            tracing::debug!(error = %self, error_code = %code, "Client error");
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        GatewayError::BadRequest(msg.into())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(err.to_string())
        } else {
            GatewayError::UpstreamUnavailable(err.to_string())
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.log();
        (self.status_code(), axum::Json(self.body())).into_response()
    }
}
