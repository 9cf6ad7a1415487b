//! Gateway error types and their HTTP rendering.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use feedlink_broker::BrokerError;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed operator or device request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The device answered, but with an application-level error.
    #[error("Device {device_id} reported an error: {message}")]
    DeviceError { device_id: String, message: String },

    /// The gateway cannot take more work right now.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Broker failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl GatewayError {
    /// Stable machine-readable code, rendered as `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::DeviceError { .. } => "device_error",
            Self::Unavailable(_) => "unavailable",
            Self::Broker(e) => e.code(),
            Self::Io(_) => "internal",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DeviceError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Broker(e) => match e {
                BrokerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                BrokerError::Transport(_) => StatusCode::BAD_GATEWAY,
                BrokerError::DeviceOffline(_) => StatusCode::SERVICE_UNAVAILABLE,
                BrokerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            },
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.code(), "request failed: {}", self);
        } else {
            debug!(code = self.code(), "request rejected: {}", self);
        }

        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
