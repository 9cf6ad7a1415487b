//! Session broker: the single entry point both transport styles call into.

use crate::envelope::{kinds, Envelope};
use crate::error::BrokerError;
use crate::liveness::{parse_telemetry, DeviceRecord, LivenessTracker, Telemetry, TransportKind};
use crate::queue::{CommandQueueStore, NewCommand, QueuedCommand};
use crate::registry::DeviceRegistry;
use crate::session::{LiveSession, SessionInfo, SEND_WRITE_TIMEOUT};
use crate::transport::FrameSink;
use crate::{validate_device_id, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What the broker did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Delivered to the waiter for this correlation id.
    Reply { correlation_id: String },
    /// Carried a correlation id nobody is waiting for; discarded.
    Orphaned { correlation_id: String },
    /// Replaced the device's telemetry snapshot.
    Telemetry,
    /// Well-formed but not actionable; discarded.
    Ignored,
    /// Not JSON. The session has been shut down.
    Malformed,
}

/// Merged view of everything the broker knows about one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub online: bool,
    pub session: Option<SessionInfo>,
    pub last_seen: Option<DateTime<Utc>>,
    pub address: Option<String>,
    pub transport: Option<TransportKind>,
    pub telemetry: Option<Telemetry>,
    pub telemetry_at: Option<DateTime<Utc>>,
    pub queue_length: usize,
    pub in_flight: usize,
    pub oldest_in_flight_secs: Option<i64>,
}

/// Registration guard for a live session.
///
/// Held by the connection task for as long as the connection is open. Dropping
/// it unregisters the session (unless a newer one already replaced it) and
/// fails any request still waiting on it.
pub struct SessionHandle {
    registry: Arc<DeviceRegistry>,
    session: Arc<LiveSession>,
}

impl SessionHandle {
    pub fn session(&self) -> &Arc<LiveSession> {
        &self.session
    }

    pub fn device_id(&self) -> &str {
        self.session.device_id()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let removed = self
            .registry
            .remove_if_current(self.session.device_id(), self.session.session_id());
        self.session.shutdown("connection closed");
        if removed {
            info!(
                device_id = %self.session.device_id(),
                session_id = %self.session.session_id(),
                "live session unregistered"
            );
        }
    }
}

/// Owns the device registry, command queues and liveness records.
///
/// Built once at startup and shared behind an `Arc` with every adapter.
pub struct SessionBroker {
    registry: Arc<DeviceRegistry>,
    queues: CommandQueueStore,
    liveness: LivenessTracker,
    next_correlation: AtomicU64,
    started_at: Instant,
}

impl Default for SessionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBroker {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new()),
            queues: CommandQueueStore::new(),
            liveness: LivenessTracker::new(),
            next_correlation: AtomicU64::new(1),
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn queues(&self) -> &CommandQueueStore {
        &self.queues
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn next_correlation_id(&self) -> String {
        let seq = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        format!("req-{}", seq)
    }

    // ---- live sessions ----

    /// Register a freshly accepted connection for `device_id`.
    ///
    /// Any session already registered under the id is closed; its pending
    /// requests fail with a transport error.
    pub async fn attach_session(
        &self,
        device_id: &str,
        sink: Box<dyn FrameSink>,
        remote_addr: Option<String>,
    ) -> Result<SessionHandle> {
        validate_device_id(device_id)?;

        let session = Arc::new(LiveSession::new(device_id, sink, remote_addr));
        let displaced = self.registry.register(session.clone());
        self.liveness
            .touch(device_id, session.remote_addr(), TransportKind::Live);

        info!(
            device_id = %device_id,
            session_id = %session.session_id(),
            remote_addr = ?session.remote_addr(),
            "live session registered"
        );

        if let Some(old) = displaced {
            warn!(
                device_id = %device_id,
                session_id = %old.session_id(),
                "evicting previous live session"
            );
            old.close("replaced by a newer session").await;
        }

        Ok(SessionHandle {
            registry: self.registry.clone(),
            session,
        })
    }

    pub fn is_online(&self, device_id: &str) -> bool {
        self.registry.contains(device_id)
    }

    /// Whether the device has ever checked in by any transport.
    pub fn is_known(&self, device_id: &str) -> bool {
        self.liveness.contains(device_id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Correlated request/reply exchange with a live device.
    ///
    /// Fails fast with [`BrokerError::DeviceOffline`] when no session is
    /// registered. The whole exchange is bounded by `timeout`; on expiry the
    /// correlation id is orphaned and a late reply is discarded.
    pub async fn request(
        &self,
        device_id: &str,
        kind: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<Envelope> {
        validate_device_id(device_id)?;
        if timeout.is_zero() {
            return Err(BrokerError::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let session = self
            .registry
            .lookup(device_id)
            .ok_or_else(|| BrokerError::DeviceOffline(device_id.to_string()))?;

        let correlation_id = self.next_correlation_id();
        let envelope = Envelope::request(kind, correlation_id.as_str(), payload);
        let deadline = tokio::time::Instant::now() + timeout;
        let waiter = session.register_waiter(&correlation_id)?;

        match tokio::time::timeout_at(deadline, session.send_envelope(&envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                session.cancel_waiter(&correlation_id);
                return Err(e);
            }
            Err(_) => {
                session.cancel_waiter(&correlation_id);
                warn!(
                    device_id = %device_id,
                    correlation_id = %correlation_id,
                    "write stalled past {:?}, closing session", timeout
                );
                session.shutdown("write stalled");
                return Err(BrokerError::Timeout {
                    device_id: device_id.to_string(),
                    after: timeout,
                });
            }
        }
        debug!(
            device_id = %device_id,
            correlation_id = %correlation_id,
            kind = %kind,
            "request sent"
        );

        match tokio::time::timeout_at(deadline, waiter).await {
            Ok(Ok(reply)) => {
                debug!(device_id = %device_id, correlation_id = %correlation_id, "reply received");
                Ok(reply)
            }
            Ok(Err(_)) => Err(BrokerError::Transport(format!(
                "session for {} closed before replying",
                device_id
            ))),
            Err(_) => {
                session.cancel_waiter(&correlation_id);
                warn!(
                    device_id = %device_id,
                    correlation_id = %correlation_id,
                    "request timed out after {:?}", timeout
                );
                Err(BrokerError::Timeout {
                    device_id: device_id.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Transmit to a live device without waiting for a reply.
    pub async fn send(&self, device_id: &str, kind: &str, payload: serde_json::Value) -> Result<()> {
        validate_device_id(device_id)?;
        let session = self
            .registry
            .lookup(device_id)
            .ok_or_else(|| BrokerError::DeviceOffline(device_id.to_string()))?;
        let envelope = Envelope::new(kind, payload);
        match tokio::time::timeout(SEND_WRITE_TIMEOUT, session.send_envelope(&envelope)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(device_id = %device_id, "write stalled, closing session");
                session.shutdown("write stalled");
                Err(BrokerError::Transport(format!(
                    "write to {} stalled for {:?}",
                    device_id, SEND_WRITE_TIMEOUT
                )))
            }
        }
    }

    /// Dispatch one inbound text frame read from `session`'s connection.
    pub fn handle_frame(&self, session: &LiveSession, text: &str) -> FrameOutcome {
        session.touch();

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    device_id = %session.device_id(),
                    "malformed frame, closing session: {}", e
                );
                session.shutdown("malformed frame");
                return FrameOutcome::Malformed;
            }
        };

        let device_id = session.device_id();
        self.liveness
            .touch(device_id, session.remote_addr(), TransportKind::Live);

        let envelope: Envelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(device_id = %device_id, "discarding frame: {}", e);
                return FrameOutcome::Ignored;
            }
        };

        if envelope.kind == kinds::TELEMETRY && envelope.is_unsolicited() {
            return match parse_telemetry(&envelope.payload) {
                Ok(telemetry) => {
                    self.liveness.record_telemetry(
                        device_id,
                        session.remote_addr(),
                        TransportKind::Live,
                        telemetry,
                    );
                    FrameOutcome::Telemetry
                }
                Err(e) => {
                    debug!(device_id = %device_id, "discarding telemetry: {}", e);
                    FrameOutcome::Ignored
                }
            };
        }

        let Some(correlation_id) = envelope.correlation_id.clone() else {
            return FrameOutcome::Ignored;
        };
        match session.fulfill(envelope) {
            Ok(()) => FrameOutcome::Reply { correlation_id },
            Err(_) => {
                debug!(
                    device_id = %device_id,
                    correlation_id = %correlation_id,
                    "no waiter for reply, discarding"
                );
                FrameOutcome::Orphaned { correlation_id }
            }
        }
    }

    /// Close every session idle for at least `max_idle`. Returns the device ids
    /// whose sessions were closed.
    pub async fn sweep_idle_sessions(&self, max_idle: Duration) -> Vec<String> {
        let mut closed = Vec::new();
        for session in self.registry.sessions() {
            if session.idle_for() < max_idle {
                continue;
            }
            if self
                .registry
                .remove_if_current(session.device_id(), session.session_id())
            {
                info!(device_id = %session.device_id(), "closing idle live session");
                session.close("idle timeout").await;
                closed.push(session.device_id().to_string());
            }
        }
        closed
    }

    /// Close all live sessions, e.g. on server shutdown.
    pub async fn close_all_sessions(&self, reason: &str) -> usize {
        let sessions = self.registry.sessions();
        for session in &sessions {
            self.registry
                .remove_if_current(session.device_id(), session.session_id());
            session.close(reason).await;
        }
        sessions.len()
    }

    // ---- queued delivery ----

    /// Queue a command for a polling device. Returns immediately.
    pub fn enqueue_command(&self, device_id: &str, command: NewCommand) -> Result<QueuedCommand> {
        let queued = self.queues.enqueue(device_id, command)?;
        debug!(device_id = %device_id, command_id = %queued.id, "command queued");
        Ok(queued)
    }

    /// Take every queued command for the device, oldest first.
    pub fn pull_commands(&self, device_id: &str, address: Option<&str>) -> Result<Vec<QueuedCommand>> {
        validate_device_id(device_id)?;
        self.liveness.touch(device_id, address, TransportKind::Poll);
        let commands = self.queues.pull_and_clear(device_id);
        if !commands.is_empty() {
            debug!(device_id = %device_id, count = commands.len(), "commands delivered");
        }
        Ok(commands)
    }

    /// Acknowledge a delivered command. Unknown ids are a no-op.
    pub fn acknowledge_command(
        &self,
        device_id: &str,
        command_id: &str,
        address: Option<&str>,
    ) -> Result<bool> {
        validate_device_id(device_id)?;
        if command_id.trim().is_empty() {
            return Err(BrokerError::InvalidArgument(
                "command id must not be empty".to_string(),
            ));
        }
        self.liveness.touch(device_id, address, TransportKind::Poll);
        Ok(self.queues.acknowledge(device_id, command_id))
    }

    // ---- liveness ----

    /// Liveness ping from a polling device.
    pub fn record_hello(&self, device_id: &str, address: Option<&str>) -> Result<DeviceRecord> {
        validate_device_id(device_id)?;
        Ok(self.liveness.touch(device_id, address, TransportKind::Poll))
    }

    /// Telemetry submission from a polling device. A present snapshot replaces
    /// the previous one wholesale.
    pub fn record_upload(
        &self,
        device_id: &str,
        address: Option<&str>,
        telemetry: Option<&serde_json::Value>,
    ) -> Result<DeviceRecord> {
        validate_device_id(device_id)?;
        match telemetry {
            Some(value) => {
                let telemetry = parse_telemetry(value)?;
                Ok(self
                    .liveness
                    .record_telemetry(device_id, address, TransportKind::Poll, telemetry))
            }
            None => Ok(self.liveness.touch(device_id, address, TransportKind::Poll)),
        }
    }

    // ---- status ----

    /// Everything known about one device, or `None` if it was never seen.
    pub fn device_status(&self, device_id: &str) -> Option<DeviceStatus> {
        let record = self.liveness.get(device_id);
        let session = self.registry.lookup(device_id);
        let queue_length = self.queues.queue_length(device_id);
        let in_flight = self.queues.in_flight_count(device_id);

        if record.is_none() && session.is_none() && queue_length == 0 && in_flight == 0 {
            return None;
        }

        Some(DeviceStatus {
            device_id: device_id.to_string(),
            online: session.is_some(),
            session: session.map(|s| s.info()),
            last_seen: record.as_ref().map(|r| r.last_seen),
            address: record.as_ref().and_then(|r| r.address.clone()),
            transport: record.as_ref().map(|r| r.transport),
            telemetry: record.as_ref().and_then(|r| r.telemetry.clone()),
            telemetry_at: record.as_ref().and_then(|r| r.telemetry_at),
            queue_length,
            in_flight,
            oldest_in_flight_secs: self
                .queues
                .oldest_in_flight_age(device_id)
                .map(|age| age.num_seconds()),
        })
    }

    /// Status of every known device, sorted by id.
    pub fn list_devices(&self) -> Vec<DeviceStatus> {
        let ids: BTreeSet<String> = self
            .liveness
            .ids()
            .into_iter()
            .chain(self.registry.ids())
            .chain(self.queues.device_ids())
            .collect();
        ids.iter().filter_map(|id| self.device_status(id)).collect()
    }
}
