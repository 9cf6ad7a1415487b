//! Live-session adapter: one WebSocket connection per device.

use crate::error::GatewayError;
use crate::handlers::client_address;
use crate::server::GatewayState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Path, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use feedlink_broker::{BrokerError, FrameSink};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Write half of a device WebSocket.
struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> feedlink_broker::Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

/// WebSocket upgrade handler for `GET /ws/:device_id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<GatewayState>>,
) -> Result<Response, GatewayError> {
    if device_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "device id must not be empty".to_string(),
        ));
    }

    if !state.has_session_capacity(&device_id) {
        warn!(
            device_id = %device_id,
            "Max live sessions ({}) reached, rejecting",
            state.config.gateway.max_sessions
        );
        return Err(GatewayError::Unavailable(
            "too many live sessions".to_string(),
        ));
    }

    let remote_addr = client_address(&headers, connect_info.as_ref());
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, device_id, remote_addr)))
}

/// Run one device connection until it closes or the broker evicts it.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<GatewayState>,
    device_id: String,
    remote_addr: Option<String>,
) {
    let (sender, mut receiver) = socket.split();
    let broker = state.broker.clone();

    let handle = match broker
        .attach_session(&device_id, Box::new(WsSink { sink: sender }), remote_addr)
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            warn!(device_id = %device_id, "Rejected live session: {}", e);
            return;
        }
    };
    let session = handle.session().clone();

    info!(
        device_id = %device_id,
        session_id = %session.session_id(),
        remote_addr = ?session.remote_addr(),
        "Device connected"
    );

    loop {
        tokio::select! {
            _ = session.closed() => {
                debug!(device_id = %device_id, "Session shut down by broker");
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    broker.handle_frame(&session, &text);
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        broker.handle_frame(&session, text);
                    }
                    Err(_) => {
                        warn!(device_id = %device_id, "Non-UTF-8 binary frame, closing session");
                        break;
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    session.touch();
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(device_id = %device_id, "Device closed connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(device_id = %device_id, "WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    drop(handle);
    info!(device_id = %device_id, session_id = %session.session_id(), "Device disconnected");
}
