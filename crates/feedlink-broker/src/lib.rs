//! Device command and telemetry broker for Feedlink.
//!
//! Feeder controllers sit behind NAT and cannot be dialled directly, so the
//! broker offers two delivery modes over one shared state object:
//! - live sessions: the device holds a long-lived connection and the broker
//!   correlates outbound requests with inbound replies
//! - polling: commands wait in a per-device FIFO until the device pulls them,
//!   then stay in flight until acknowledged
//!
//! Transports plug in through [`FrameSink`]; the gateway crate provides the
//! WebSocket and HTTP adapters.

pub mod broker;
pub mod envelope;
pub mod error;
pub mod liveness;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;

pub use broker::{DeviceStatus, FrameOutcome, SessionBroker, SessionHandle};
pub use envelope::{kinds, Envelope};
pub use error::BrokerError;
pub use liveness::{DeviceRecord, LivenessTracker, Telemetry, TransportKind};
pub use queue::{CommandQueueStore, InFlightEntry, NewCommand, QueuedCommand};
pub use registry::DeviceRegistry;
pub use session::{LiveSession, SessionInfo};
pub use transport::{ChannelSink, FrameSink};

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Reject empty or whitespace-only device identifiers.
pub(crate) fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() {
        return Err(BrokerError::InvalidArgument(
            "device id must not be empty".to_string(),
        ));
    }
    Ok(())
}
