//! Device registry: device id → current live session.

use crate::session::LiveSession;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Map from device id to its current live session.
///
/// One reader/writer lock guards the map. Critical sections are constant time
/// and never span an `.await`.
#[derive(Default)]
pub struct DeviceRegistry {
    sessions: RwLock<HashMap<String, Arc<LiveSession>>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for its device id.
    ///
    /// Replacement is the normal reconnect path. The displaced session is
    /// returned so the caller can close its connection.
    pub fn register(&self, session: Arc<LiveSession>) -> Option<Arc<LiveSession>> {
        let mut sessions = self.sessions.write();
        sessions.insert(session.device_id().to_string(), session)
    }

    /// Remove the session for `device_id`, if any.
    pub fn remove(&self, device_id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.write().remove(device_id)
    }

    /// Remove the entry only if it still holds the session instance
    /// `session_id`. A connection tearing down after being replaced must not
    /// unregister its successor.
    pub fn remove_if_current(&self, device_id: &str, session_id: &str) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(device_id) {
            Some(current) if current.session_id() == session_id => {
                sessions.remove(device_id);
                true
            }
            _ => false,
        }
    }

    /// Look up the live session for a device.
    pub fn lookup(&self, device_id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.read().get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.sessions.read().contains_key(device_id)
    }

    /// Snapshot of all registered sessions.
    pub fn sessions(&self) -> Vec<Arc<LiveSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Registered device ids.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
