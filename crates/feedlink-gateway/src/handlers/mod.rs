//! HTTP handlers for the polling, operator and status endpoints.

pub mod command;
pub mod poll;
pub mod status;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Observed client address: the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, otherwise the peer address of the TCP connection.
pub fn client_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        });

    match forwarded {
        Some(addr) => Some(addr.to_string()),
        None => connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}
