//! Shared harness for the Feedlink integration tests.
//!
//! Starts a real gateway on an ephemeral loopback port and provides helpers
//! for playing the device side over WebSocket.

use feedlink_broker::SessionBroker;
use feedlink_core::Config;
use feedlink_gateway::Gateway;
use futures::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Client side of a device WebSocket.
pub type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A gateway serving on `127.0.0.1:<ephemeral>`.
pub struct TestServer {
    pub addr: SocketAddr,
    pub broker: Arc<SessionBroker>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server with the default configuration.
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    /// Start a server with the given configuration. The configured port is
    /// ignored in favour of an ephemeral one.
    pub async fn start_with(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let gateway = Gateway::new(config);
        let broker = gateway.broker().clone();
        let (tx, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            gateway
                .serve(listener, async move {
                    let _ = rx.await;
                })
                .await
                .expect("gateway serve");
        });

        Self {
            addr,
            broker,
            shutdown: Some(tx),
            task: Some(task),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, device_id: &str) -> String {
        format!("ws://{}/ws/{}", self.addr, device_id)
    }

    /// Connect as a device and wait until the broker has registered it.
    pub async fn connect_device(&self, device_id: &str) -> DeviceSocket {
        let (socket, _) = tokio_tungstenite::connect_async(self.ws_url(device_id))
            .await
            .expect("device connect");
        let broker = self.broker.clone();
        let id = device_id.to_string();
        wait_for(move || broker.is_online(&id)).await;
        socket
    }

    /// Signal shutdown and wait for the server task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(10), task)
                .await
                .expect("server did not shut down")
                .expect("server task panicked");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Next text frame from the server, parsed as JSON. Returns `None` when the
/// connection closes first.
pub async fn next_json(socket: &mut DeviceSocket) -> Option<Value> {
    let read = async {
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).expect("server sent invalid JSON"))
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("no frame from server within 5s")
}
