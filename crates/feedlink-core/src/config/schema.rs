//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main Feedlink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway (HTTP + WebSocket listener) settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Broker timing and session policy.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS for the operator API.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Maximum number of concurrently registered live sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            cors: true,
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_port() -> u16 {
    8787
}

fn default_max_sessions() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

/// Bind mode for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces so devices on the LAN (or behind NAT) can dial in.
    Lan,
}

impl BindMode {
    /// IP octets to bind for this mode.
    pub fn ip(&self) -> [u8; 4] {
        match self {
            Self::Loopback => [127, 0, 0, 1],
            Self::Lan => [0, 0, 0, 0],
        }
    }
}

impl std::str::FromStr for BindMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loopback" => Ok(Self::Loopback),
            "lan" => Ok(Self::Lan),
            other => Err(format!("Invalid bind mode: {} (expected loopback or lan)", other)),
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Default timeout for operator commands sent over a live session.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Fixed timeout for discovery exchanges.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    /// Upper bound for caller-supplied timeouts (commands and proxy requests).
    #[serde(default = "default_max_request_timeout")]
    pub max_request_timeout_secs: u64,

    /// Close live sessions with no inbound traffic for this long. 0 disables.
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    /// How often the idle sweeper runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
            max_request_timeout_secs: default_max_request_timeout(),
            session_idle_timeout_secs: default_session_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl BrokerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn max_request_timeout(&self) -> Duration {
        Duration::from_secs(self.max_request_timeout_secs)
    }

    /// Idle timeout, or `None` when the sweeper is disabled.
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.session_idle_timeout_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_command_timeout() -> u64 {
    10
}

fn default_discovery_timeout() -> u64 {
    5
}

fn default_max_request_timeout() -> u64 {
    60
}

fn default_session_idle_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,

    /// One JSON object per line.
    Json,
}
