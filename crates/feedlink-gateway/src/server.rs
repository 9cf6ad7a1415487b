//! Gateway server: router, listener and background tasks.

use crate::error::GatewayError;
use crate::handlers::{command, poll, status};
use crate::ws::ws_handler;
use crate::Result;
use axum::{
    http::{header, request::Parts, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use feedlink_broker::SessionBroker;
use feedlink_core::config::BindMode;
use feedlink_core::Config;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Origins accepted for the operator API on a loopback bind.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// An http(s) origin on a loopback host, any port.
fn is_local_origin(origin: &str) -> bool {
    let Ok(url) = url::Url::parse(origin) else {
        return false;
    };
    matches!(url.scheme(), "http" | "https")
        && url.username().is_empty()
        && url.password().is_none()
        && url.host_str().is_some_and(|host| LOCAL_HOSTS.contains(&host))
}

/// Shared state handed to every handler.
pub struct GatewayState {
    /// The broker all adapters drive.
    pub broker: Arc<SessionBroker>,

    /// Configuration.
    pub config: Config,
}

impl GatewayState {
    /// Timeout for an operator command, honouring a caller override within the
    /// configured ceiling.
    pub(crate) fn request_timeout(&self, timeout_ms: Option<u64>) -> Result<Duration> {
        let broker = &self.config.broker;
        match timeout_ms {
            None => Ok(broker.command_timeout().min(broker.max_request_timeout())),
            Some(0) => Err(GatewayError::InvalidRequest(
                "timeout_ms must be greater than zero".to_string(),
            )),
            Some(ms) => Ok(Duration::from_millis(ms).min(broker.max_request_timeout())),
        }
    }

    /// Whether a new live session for `device_id` may be accepted.
    pub(crate) fn has_session_capacity(&self, device_id: &str) -> bool {
        self.broker.is_online(device_id)
            || self.broker.session_count() < self.config.gateway.max_sessions
    }
}

/// The Feedlink gateway server.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a gateway with a fresh broker.
    pub fn new(config: Config) -> Self {
        Self::with_broker(config, Arc::new(SessionBroker::new()))
    }

    /// Create a gateway around an existing broker.
    pub fn with_broker(config: Config, broker: Arc<SessionBroker>) -> Self {
        Self {
            state: Arc::new(GatewayState { broker, config }),
        }
    }

    pub fn broker(&self) -> &Arc<SessionBroker> {
        &self.state.broker
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Get the bind address.
    pub fn bind_address(&self) -> SocketAddr {
        let gateway = &self.state.config.gateway;
        SocketAddr::from((gateway.bind.ip(), gateway.port))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let addr = self.bind_address();
        if self.state.config.gateway.bind != BindMode::Loopback {
            warn!("Gateway binding to {}; it is reachable from the network", addr);
        }

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Live sessions are closed when the signal fires so their connections do
    /// not hold the server open.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!("Starting gateway server on {}", local_addr);

        let sweeper = self.spawn_sweeper();
        let broker = self.state.broker.clone();
        let signal = async move {
            shutdown.await;
            let closed = broker.close_all_sessions("server shutting down").await;
            info!(sessions = closed, "Gateway shutting down");
        };

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(GatewayError::Io);

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        result
    }

    /// Build the router. Exposed for in-process tests.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let mut router = Router::new()
            .route("/health", get(status::health))
            .route("/ws/:device_id", get(ws_handler))
            .route("/api/devices", get(status::list_devices))
            .route("/api/devices/:device_id", get(status::get_device))
            .route("/api/devices/:device_id/command", post(command::send_command))
            .route("/api/devices/:device_id/discover", get(command::discover))
            .route("/api/poll/:device_id/hello", post(poll::hello))
            .route("/api/poll/:device_id/upload", post(poll::upload))
            .route("/api/poll/:device_id/next", get(poll::next).post(poll::next))
            .route("/api/poll/:device_id/ack", post(poll::ack))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.state.config.gateway.cors {
            router = router.layer(Self::create_cors_layer(self.state.config.gateway.bind));
        }

        router
    }

    fn create_cors_layer(bind: BindMode) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .max_age(Duration::from_secs(3600));

        match bind {
            // Loopback: a locally served front end on any port.
            BindMode::Loopback => layer.allow_origin(AllowOrigin::predicate(
                |origin: &HeaderValue, _: &Parts| {
                    origin
                        .to_str()
                        .map(is_local_origin)
                        .unwrap_or(false)
                },
            )),
            BindMode::Lan => layer.allow_origin(Any),
        }
    }

    /// Periodically close idle live sessions, if an idle timeout is set.
    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let broker_config = &self.state.config.broker;
        let max_idle = broker_config.session_idle_timeout()?;
        let period = broker_config.sweep_interval().max(Duration::from_secs(1));
        let broker = self.state.broker.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let closed = broker.sweep_idle_sessions(max_idle).await;
                if !closed.is_empty() {
                    info!(count = closed.len(), "Closed idle live sessions: {:?}", closed);
                }
            }
        }))
    }

    /// Get live session count.
    pub fn session_count(&self) -> usize {
        self.state.broker.session_count()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
