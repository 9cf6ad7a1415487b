//! Store-and-forward command queues for polling devices.

use crate::error::BrokerError;
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of auto-assigned command ids; unique for the process lifetime.
static NEXT_COMMAND_SEQ: AtomicU64 = AtomicU64::new(1);

fn default_kind() -> String {
    "command".to_string()
}

/// A command waiting for, or delivered to, a polling device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
    /// Command id, unique within the device's in-flight set.
    pub id: String,

    /// Command type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload.
    #[serde(default)]
    pub payload: Map<String, Value>,

    /// When the command was enqueued.
    pub created_at: DateTime<Utc>,
}

/// A command as submitted by an operator, before an id is assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCommand {
    /// Caller-supplied id; assigned by the store when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Command type.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Type-specific payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl NewCommand {
    /// Create a command of the given type with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Set the command id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add one payload field.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Build from a flat operator command object: `id` and `type` are lifted
    /// out, every other field becomes the payload.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self> {
        let id = match object.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(other) => {
                return Err(BrokerError::InvalidArgument(format!(
                    "command id must be a string, got {}",
                    other
                )))
            }
        };
        let kind = match object.remove("type") {
            None | Some(Value::Null) => default_kind(),
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            Some(other) => {
                return Err(BrokerError::InvalidArgument(format!(
                    "command type must be a non-empty string, got {}",
                    other
                )))
            }
        };
        Ok(Self {
            id,
            kind,
            payload: object,
        })
    }
}

/// An in-flight command id and when it entered the set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InFlightEntry {
    pub id: String,
    pub since: DateTime<Utc>,
}

#[derive(Default)]
struct DeviceQueue {
    pending: VecDeque<QueuedCommand>,
    in_flight: HashMap<String, DateTime<Utc>>,
}

impl DeviceQueue {
    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// Per-device FIFO queues plus in-flight tracking.
///
/// Commands are never dropped except by an explicit pull, and in-flight ids
/// leave only through an acknowledgment. Nothing here expires or retries.
#[derive(Default)]
pub struct CommandQueueStore {
    queues: Mutex<HashMap<String, DeviceQueue>>,
}

impl CommandQueueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command to the device's queue and mark its id in flight.
    pub fn enqueue(&self, device_id: &str, command: NewCommand) -> Result<QueuedCommand> {
        crate::validate_device_id(device_id)?;
        if let Some(id) = &command.id {
            if id.trim().is_empty() {
                return Err(BrokerError::InvalidArgument(
                    "command id must not be empty".to_string(),
                ));
            }
        }

        let mut queues = self.queues.lock();
        let queue = queues.entry(device_id.to_string()).or_default();

        let id = match command.id {
            Some(id) => {
                if queue.in_flight.contains_key(&id) {
                    return Err(BrokerError::InvalidArgument(format!(
                        "command {} is already in flight for {}",
                        id, device_id
                    )));
                }
                id
            }
            None => loop {
                let seq = NEXT_COMMAND_SEQ.fetch_add(1, Ordering::Relaxed);
                let candidate = format!("{}-{}", device_id, seq);
                if !queue.in_flight.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let queued = QueuedCommand {
            id: id.clone(),
            kind: command.kind,
            payload: command.payload,
            created_at: Utc::now(),
        };
        queue.in_flight.insert(id, queued.created_at);
        queue.pending.push_back(queued.clone());
        Ok(queued)
    }

    /// Atomically take every pending command, oldest first. Taken commands stay
    /// in flight until acknowledged.
    pub fn pull_and_clear(&self, device_id: &str) -> Vec<QueuedCommand> {
        let mut queues = self.queues.lock();
        match queues.get_mut(device_id) {
            Some(queue) => queue.pending.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Remove `command_id` from the in-flight set. Returns whether it was there;
    /// unknown ids are a no-op.
    pub fn acknowledge(&self, device_id: &str, command_id: &str) -> bool {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(device_id) else {
            return false;
        };
        let removed = queue.in_flight.remove(command_id).is_some();
        if queue.is_empty() {
            queues.remove(device_id);
        }
        removed
    }

    /// Commands waiting to be pulled.
    pub fn queue_length(&self, device_id: &str) -> usize {
        self.queues
            .lock()
            .get(device_id)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }

    /// Commands not yet acknowledged.
    pub fn in_flight_count(&self, device_id: &str) -> usize {
        self.queues
            .lock()
            .get(device_id)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    /// In-flight ids, oldest first.
    pub fn in_flight(&self, device_id: &str) -> Vec<InFlightEntry> {
        let queues = self.queues.lock();
        let mut entries: Vec<InFlightEntry> = queues
            .get(device_id)
            .map(|q| {
                q.in_flight
                    .iter()
                    .map(|(id, since)| InFlightEntry {
                        id: id.clone(),
                        since: *since,
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.since.cmp(&b.since).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Age of the oldest unacknowledged command.
    pub fn oldest_in_flight_age(&self, device_id: &str) -> Option<chrono::Duration> {
        let queues = self.queues.lock();
        let oldest = queues.get(device_id)?.in_flight.values().min().copied()?;
        Some(Utc::now() - oldest)
    }

    /// Devices with queued or in-flight commands.
    pub fn device_ids(&self) -> Vec<String> {
        self.queues.lock().keys().cloned().collect()
    }
}
