//! Operator endpoints: commands, HTTP proxying and discovery.

use crate::error::GatewayError;
use crate::server::GatewayState;
use crate::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use feedlink_broker::{kinds, BrokerError, Envelope, NewCommand};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How an operator command reaches the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Live session when connected, otherwise the queue for known devices.
    #[default]
    Auto,
    /// Live session only.
    Live,
    /// Always queue for the next poll.
    Queue,
}

/// Body of `POST /api/devices/:device_id/command`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: Option<Map<String, Value>>,

    #[serde(default)]
    pub proxy: Option<ProxyRequest>,

    #[serde(default)]
    pub delivery: Delivery,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// An HTTP-shaped request for the device to perform and answer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyRequest {
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Turn a device reply into an HTTP response, keeping device-side failures
/// distinct from gateway failures.
fn reply_response(device_id: &str, reply: Envelope) -> Result<Response> {
    match reply.error {
        Some(message) => Err(GatewayError::DeviceError {
            device_id: device_id.to_string(),
            message,
        }),
        None => Ok(Json(reply.payload).into_response()),
    }
}

/// `POST /api/devices/:device_id/command`
pub async fn send_command(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
    body: std::result::Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;

    match (request.command, request.proxy) {
        (Some(command), None) => {
            let timeout = state.request_timeout(request.timeout_ms)?;
            dispatch_command(&state, &device_id, command, request.delivery, timeout).await
        }
        (None, Some(proxy)) => {
            if request.timeout_ms.is_some() || request.delivery != Delivery::Auto {
                return Err(GatewayError::InvalidRequest(
                    "delivery and timeout_ms apply to commands only; set proxy.timeout_ms"
                        .to_string(),
                ));
            }
            relay_proxy(&state, &device_id, proxy).await
        }
        _ => Err(GatewayError::InvalidRequest(
            "body must contain exactly one of \"command\" or \"proxy\"".to_string(),
        )),
    }
}

async fn dispatch_command(
    state: &GatewayState,
    device_id: &str,
    command: Map<String, Value>,
    delivery: Delivery,
    timeout: Duration,
) -> Result<Response> {
    let broker = &state.broker;
    let live = match delivery {
        Delivery::Live => true,
        Delivery::Queue => false,
        Delivery::Auto => {
            if broker.is_online(device_id) {
                true
            } else if broker.is_known(device_id) {
                false
            } else {
                return Err(BrokerError::DeviceOffline(device_id.to_string()).into());
            }
        }
    };

    if live {
        debug!(device_id = %device_id, "Forwarding command over live session");
        let reply = broker
            .request(device_id, kinds::COMMAND, Value::Object(command), timeout)
            .await?;
        return reply_response(device_id, reply);
    }

    let queued = broker.enqueue_command(device_id, NewCommand::from_object(command)?)?;
    info!(device_id = %device_id, command_id = %queued.id, "Command queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "queued",
            "command": queued,
        })),
    )
        .into_response())
}

async fn relay_proxy(state: &GatewayState, device_id: &str, proxy: ProxyRequest) -> Result<Response> {
    if proxy.url.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "proxy.url must not be empty".to_string(),
        ));
    }
    let method = proxy.method.trim().to_ascii_uppercase();
    if method.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "proxy.method must not be empty".to_string(),
        ));
    }
    let timeout = state.request_timeout(proxy.timeout_ms)?;

    debug!(device_id = %device_id, method = %method, url = %proxy.url, "Relaying proxy request");
    let payload = json!({
        "method": method,
        "url": proxy.url,
        "headers": proxy.headers,
        "body": proxy.body,
    });
    let reply = state
        .broker
        .request(device_id, kinds::PROXY, payload, timeout)
        .await?;
    reply_response(device_id, reply)
}

/// `GET /api/devices/:device_id/discover`
pub async fn discover(
    State(state): State<Arc<GatewayState>>,
    Path(device_id): Path<String>,
) -> Result<Response> {
    let timeout = state.config.broker.discovery_timeout();
    let reply = state
        .broker
        .request(&device_id, kinds::DESCRIBE, json!({}), timeout)
        .await?;
    reply_response(&device_id, reply)
}
