//! Device liveness and last-known telemetry.

use crate::error::BrokerError;
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Sensor name → reading.
pub type Telemetry = BTreeMap<String, f64>;

/// Parse a telemetry payload: a JSON object whose values are all numbers.
pub fn parse_telemetry(value: &serde_json::Value) -> Result<Telemetry> {
    let object = value.as_object().ok_or_else(|| {
        BrokerError::InvalidArgument("telemetry must be a JSON object".to_string())
    })?;
    object
        .iter()
        .map(|(name, reading)| {
            reading
                .as_f64()
                .map(|v| (name.clone(), v))
                .ok_or_else(|| {
                    BrokerError::InvalidArgument(format!(
                        "telemetry value for {} is not a number",
                        name
                    ))
                })
        })
        .collect()
}

/// How the device was last heard from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP polling (hello/upload/next/ack).
    Poll,
    /// Live bidirectional session.
    Live,
}

/// Most recent liveness information for one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub address: Option<String>,
    pub transport: TransportKind,
    pub telemetry: Option<Telemetry>,
    pub telemetry_at: Option<DateTime<Utc>>,
}

/// Liveness records keyed by device id. Most recent write wins.
#[derive(Default)]
pub struct LivenessTracker {
    records: RwLock<HashMap<String, DeviceRecord>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert last-seen, and the address when one is known.
    pub fn touch(
        &self,
        device_id: &str,
        address: Option<&str>,
        transport: TransportKind,
    ) -> DeviceRecord {
        self.upsert(device_id, address, transport, None)
    }

    /// Upsert last-seen and replace the telemetry snapshot wholesale.
    pub fn record_telemetry(
        &self,
        device_id: &str,
        address: Option<&str>,
        transport: TransportKind,
        telemetry: Telemetry,
    ) -> DeviceRecord {
        self.upsert(device_id, address, transport, Some(telemetry))
    }

    fn upsert(
        &self,
        device_id: &str,
        address: Option<&str>,
        transport: TransportKind,
        telemetry: Option<Telemetry>,
    ) -> DeviceRecord {
        let now = Utc::now();
        let mut records = self.records.write();
        let record = records
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceRecord {
                device_id: device_id.to_string(),
                first_seen: now,
                last_seen: now,
                address: None,
                transport,
                telemetry: None,
                telemetry_at: None,
            });

        record.last_seen = now;
        record.transport = transport;
        if let Some(address) = address {
            record.address = Some(address.to_string());
        }
        if let Some(telemetry) = telemetry {
            record.telemetry = Some(telemetry);
            record.telemetry_at = Some(now);
        }
        record.clone()
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.records.read().get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.records.read().contains_key(device_id)
    }

    /// Known device ids.
    pub fn ids(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_touch_creates_then_updates() {
        let tracker = LivenessTracker::new();
        let first = tracker.touch("dev-1", Some("10.0.0.2:4000"), TransportKind::Poll);
        assert_eq!(first.first_seen, first.last_seen);

        let second = tracker.touch("dev-1", None, TransportKind::Live);
        assert_eq!(second.first_seen, first.first_seen);
        assert!(second.last_seen >= first.last_seen);
        // Unknown address keeps the previous one.
        assert_eq!(second.address.as_deref(), Some("10.0.0.2:4000"));
        assert_eq!(second.transport, TransportKind::Live);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_telemetry_replaced_wholesale() {
        let tracker = LivenessTracker::new();
        let first = parse_telemetry(&json!({"temp": 21.5, "weight": 3})).unwrap();
        tracker.record_telemetry("dev-1", None, TransportKind::Poll, first);

        let second = parse_telemetry(&json!({"humidity": 40})).unwrap();
        let record = tracker.record_telemetry("dev-1", None, TransportKind::Poll, second);

        let telemetry = record.telemetry.unwrap();
        assert_eq!(telemetry.len(), 1);
        assert_eq!(telemetry.get("humidity"), Some(&40.0));
        assert!(record.telemetry_at.is_some());
    }

    #[test]
    fn test_touch_keeps_telemetry() {
        let tracker = LivenessTracker::new();
        let telemetry = parse_telemetry(&json!({"temp": 20})).unwrap();
        tracker.record_telemetry("dev-1", None, TransportKind::Poll, telemetry);
        let record = tracker.touch("dev-1", None, TransportKind::Poll);
        assert!(record.telemetry.is_some());
    }

    #[test]
    fn test_parse_telemetry_rejects_non_numeric() {
        assert!(parse_telemetry(&json!({"temp": "hot"})).is_err());
        assert!(parse_telemetry(&json!([1, 2])).is_err());
        assert!(parse_telemetry(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_get_unknown() {
        let tracker = LivenessTracker::new();
        assert!(tracker.get("ghost").is_none());
        assert!(!tracker.contains("ghost"));
        assert!(tracker.is_empty());
    }
}
