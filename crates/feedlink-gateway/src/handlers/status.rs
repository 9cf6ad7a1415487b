//! Status and health endpoints.

use crate::error::GatewayError;
use crate::server::GatewayState;
use crate::Result;
use axum::extract::{Path, State};
use axum::Json;
use feedlink_broker::DeviceStatus;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: &'static str,

    /// Gateway version.
    pub version: &'static str,

    /// Uptime in seconds.
    pub uptime_seconds: u64,

    /// Currently registered live sessions.
    pub live_sessions: usize,

    /// Devices seen by any transport since startup.
    pub known_devices: usize,
}

/// `GET /health`
pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.broker.uptime().as_secs(),
        live_sessions: state.broker.session_count(),
        known_devices: state.broker.liveness().len(),
    })
}

/// `GET /api/devices`
pub async fn list_devices(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let devices = state.broker.list_devices();
    Json(json!({
        "count": devices.len(),
        "devices": devices,
    }))
}

/// `GET /api/devices/:device_id`
pub async fn get_device(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStatus>> {
    state
        .broker
        .device_status(&device_id)
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("device {}", device_id)))
}
