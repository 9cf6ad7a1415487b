//! Polling endpoints for devices without a live session.

use super::client_address;
use crate::server::GatewayState;
use crate::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Body of `POST /api/poll/:device_id/upload`.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub telemetry: Option<Value>,
}

/// Body of `POST /api/poll/:device_id/ack`.
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub command_id: String,
}

/// `POST /api/poll/:device_id/hello`: liveness ping; echoes the observed address.
pub async fn hello(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<Value>> {
    let address = client_address(&headers, connect_info.as_ref());
    let record = state.broker.record_hello(&device_id, address.as_deref())?;
    debug!(device_id = %device_id, address = ?record.address, "hello");

    Ok(Json(json!({
        "device_id": record.device_id,
        "address": record.address,
        "server_time": record.last_seen,
        "pending": state.broker.queues().queue_length(&device_id),
    })))
}

/// `POST /api/poll/:device_id/upload`: telemetry submission.
pub async fn upload(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: std::result::Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let address = client_address(&headers, connect_info.as_ref());
    let record = state.broker.record_upload(
        &device_id,
        address.as_deref(),
        request.telemetry.as_ref(),
    )?;
    debug!(device_id = %device_id, "telemetry uploaded");

    Ok(Json(json!({
        "status": "ok",
        "telemetry_at": record.telemetry_at,
        "pending": state.broker.queues().queue_length(&device_id),
    })))
}

/// `GET|POST /api/poll/:device_id/next`: pull and clear the command queue.
pub async fn next(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<Value>> {
    let address = client_address(&headers, connect_info.as_ref());
    let commands = state.broker.pull_commands(&device_id, address.as_deref())?;
    Ok(Json(json!({ "commands": commands })))
}

/// `POST /api/poll/:device_id/ack`: acknowledge a delivered command.
pub async fn ack(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: std::result::Result<Json<AckRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let address = client_address(&headers, connect_info.as_ref());
    let acknowledged =
        state
            .broker
            .acknowledge_command(&device_id, &request.command_id, address.as_deref())?;
    debug!(device_id = %device_id, command_id = %request.command_id, acknowledged, "ack");

    Ok(Json(json!({
        "command_id": request.command_id,
        "acknowledged": acknowledged,
    })))
}
