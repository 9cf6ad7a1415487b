//! Live device sessions.

use crate::envelope::{kinds, Envelope};
use crate::error::BrokerError;
use crate::transport::FrameSink;
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on delivering the close notice to a device that stopped reading.
pub const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on a fire-and-forget write.
pub const SEND_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Waiters for correlated replies, keyed by correlation id.
struct PendingWaiters {
    waiters: HashMap<String, oneshot::Sender<Envelope>>,
    closed: bool,
}

/// Last inbound traffic on a session.
struct Activity {
    at: DateTime<Utc>,
    instant: Instant,
}

/// One active bidirectional connection to a device.
///
/// The session owns the connection's write half. Every write goes through the
/// session's write lock so frames never interleave. Replies are matched to
/// requests through the pending-waiter map, which the connection's single
/// read loop fulfils via [`SessionBroker::handle_frame`](crate::SessionBroker::handle_frame).
pub struct LiveSession {
    device_id: String,
    session_id: String,
    remote_addr: Option<String>,
    connected_at: DateTime<Utc>,
    activity: Mutex<Activity>,
    writer: tokio::sync::Mutex<Box<dyn FrameSink>>,
    pending: Mutex<PendingWaiters>,
    shutdown: watch::Sender<bool>,
}

/// Serializable snapshot of a session for status listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub remote_addr: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub pending_requests: usize,
}

impl LiveSession {
    /// Create a session around the write half of a freshly accepted connection.
    pub fn new(
        device_id: impl Into<String>,
        sink: Box<dyn FrameSink>,
        remote_addr: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let (shutdown, _) = watch::channel(false);
        Self {
            device_id: device_id.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            remote_addr,
            connected_at: now,
            activity: Mutex::new(Activity {
                at: now,
                instant: Instant::now(),
            }),
            writer: tokio::sync::Mutex::new(sink),
            pending: Mutex::new(PendingWaiters {
                waiters: HashMap::new(),
                closed: false,
            }),
            shutdown,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Unique id of this connection instance; differs across reconnects.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity.lock().at
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.activity.lock().instant.elapsed()
    }

    /// Record inbound traffic.
    pub fn touch(&self) {
        let mut activity = self.activity.lock();
        activity.at = Utc::now();
        activity.instant = Instant::now();
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    /// Register a waiter for `correlation_id`. Must happen before the request
    /// is written so a fast reply cannot be missed.
    pub fn register_waiter(&self, correlation_id: &str) -> Result<oneshot::Receiver<Envelope>> {
        let mut pending = self.pending.lock();
        if pending.closed {
            return Err(BrokerError::Transport(format!(
                "session for {} is closed",
                self.device_id
            )));
        }
        if pending.waiters.contains_key(correlation_id) {
            return Err(BrokerError::InvalidArgument(format!(
                "correlation id {} already pending",
                correlation_id
            )));
        }
        let (tx, rx) = oneshot::channel();
        pending.waiters.insert(correlation_id.to_string(), tx);
        Ok(rx)
    }

    /// Drop the waiter for `correlation_id`. A reply arriving later is discarded.
    pub fn cancel_waiter(&self, correlation_id: &str) -> bool {
        self.pending.lock().waiters.remove(correlation_id).is_some()
    }

    /// Hand a reply to its waiter. Gives the envelope back when nobody is
    /// waiting for its correlation id.
    pub fn fulfill(&self, envelope: Envelope) -> std::result::Result<(), Envelope> {
        let Some(id) = envelope.correlation_id.as_deref() else {
            return Err(envelope);
        };
        let waiter = self.pending.lock().waiters.remove(id);
        match waiter {
            Some(tx) => tx.send(envelope),
            None => Err(envelope),
        }
    }

    /// Serialize and transmit an envelope under the write lock.
    ///
    /// A failed write marks the session closed so the connection's owner tears
    /// it down; the write is not retried.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(BrokerError::Transport(format!(
                "session for {} is closed",
                self.device_id
            )));
        }
        let text = envelope.to_text()?;

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send_text(text).await {
            drop(writer);
            warn!(device_id = %self.device_id, "write failed: {}", e);
            self.shutdown("write failed");
            return Err(e);
        }
        Ok(())
    }

    /// Mark the session closed, fail all pending waiters, and signal the read
    /// loop to stop. Returns false if it was already closed.
    pub fn shutdown(&self, reason: &str) -> bool {
        let drained = {
            let mut pending = self.pending.lock();
            if pending.closed {
                return false;
            }
            pending.closed = true;
            std::mem::take(&mut pending.waiters)
        };
        if !drained.is_empty() {
            debug!(
                device_id = %self.device_id,
                count = drained.len(),
                "failing pending requests: {}", reason
            );
        }
        // Dropping the senders wakes every waiter with a receive error.
        drop(drained);
        self.shutdown.send_replace(true);
        true
    }

    /// Shut down and close the connection, telling the device why.
    ///
    /// Gives up on the notice after [`CLOSE_WRITE_TIMEOUT`] when the write lock
    /// or the connection is stuck.
    pub async fn close(&self, reason: &str) {
        self.shutdown(reason);
        let notice = Envelope::new(kinds::CLOSE, serde_json::json!({ "reason": reason }));
        let farewell = async {
            let mut writer = self.writer.lock().await;
            if let Ok(text) = notice.to_text() {
                let _ = writer.send_text(text).await;
            }
            writer.close().await;
        };
        if tokio::time::timeout(CLOSE_WRITE_TIMEOUT, farewell).await.is_err() {
            debug!(
                device_id = %self.device_id,
                "close notice not delivered within {:?}", CLOSE_WRITE_TIMEOUT
            );
        }
    }

    /// Resolves once the session has been shut down.
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            remote_addr: self.remote_addr.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity(),
            pending_requests: self.pending_count(),
        }
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("device_id", &self.device_id)
            .field("session_id", &self.session_id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
