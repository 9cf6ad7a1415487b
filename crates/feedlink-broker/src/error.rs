//! Broker error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No live session (or liveness record, where one is required) for the device.
    #[error("Device offline: {0}")]
    DeviceOffline(String),

    /// The correlated reply did not arrive within the caller's budget.
    #[error("Timed out after {after:?} waiting for device {device_id}")]
    Timeout { device_id: String, after: Duration },

    /// Writing to, or reading from, the live connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed identifier, payload, or parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl BrokerError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceOffline(_) => "device_offline",
            Self::Timeout { .. } => "device_timeout",
            Self::Transport(_) => "transport_error",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}
