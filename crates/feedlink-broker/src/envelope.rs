//! Wire envelope exchanged with devices over live sessions.

use serde::{Deserialize, Deserializer, Serialize};

/// Well-known envelope types.
pub mod kinds {
    /// Operator command forwarded to the device.
    pub const COMMAND: &str = "command";
    /// HTTP-shaped request relayed to the device.
    pub const PROXY: &str = "proxy";
    /// Ask the device to describe an attached sub-component.
    pub const DESCRIBE: &str = "describe";
    /// Device reply to a correlated request.
    pub const REPLY: &str = "reply";
    /// Device sensor snapshot.
    pub const TELEMETRY: &str = "telemetry";
    /// Device liveness ping.
    pub const HELLO: &str = "hello";
    /// Server notice that the session is being closed.
    pub const CLOSE: &str = "close";
}

/// One JSON message on a live session.
///
/// Outbound requests carry a fresh `correlation_id`; the device echoes it in
/// its reply. Frames without a correlation id are unsolicited (telemetry,
/// hello). Inbound frames are matched on `correlation_id` alone, so a reply
/// may omit `type` and carry its timestamp in any shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Correlation ID (for matching replies to requests).
    #[serde(
        default,
        alias = "request_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,

    /// Send time, unix milliseconds.
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: i64,

    /// Type-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Application-level error reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Create an unsolicited envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            correlation_id: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload,
            error: None,
        }
    }

    /// Create a request envelope carrying a correlation id.
    pub fn request(
        kind: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(kind, payload).with_correlation_id(correlation_id)
    }

    /// Create a reply to the given correlation id.
    pub fn reply(correlation_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::request(kinds::REPLY, correlation_id, payload)
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Attach an application-level error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Whether this frame is unsolicited (no correlation id).
    pub fn is_unsolicited(&self) -> bool {
        self.correlation_id.is_none()
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a text frame.
    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Accept integer, float or numeric-string timestamps; anything else reads as 0.
fn lenient_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let millis = match &value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f as i64)
            .unwrap_or_default(),
        _ => 0,
    };
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let envelope = Envelope::request(kinds::COMMAND, "req-7", json!({"feed": 3}));
        let text = envelope.to_text().unwrap();
        assert!(text.contains("\"type\":\"command\""));
        assert!(text.contains("\"correlation_id\":\"req-7\""));
        assert!(!text.contains("\"error\""));
        assert!(envelope.timestamp > 0);
    }

    #[test]
    fn test_device_frame_defaults() {
        let envelope = Envelope::from_text(r#"{"type":"telemetry","payload":{"t":1.5}}"#).unwrap();
        assert!(envelope.is_unsolicited());
        assert_eq!(envelope.timestamp, 0);
        assert_eq!(envelope.payload["t"], json!(1.5));
    }

    #[test]
    fn test_request_id_alias() {
        let envelope = Envelope::from_text(r#"{"type":"reply","request_id":"req-1"}"#).unwrap();
        assert_eq!(envelope.correlation_id.as_deref(), Some("req-1"));
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn test_reply_with_error() {
        let envelope = Envelope::reply("req-2", json!(null)).with_error("hopper empty");
        assert_eq!(envelope.kind, kinds::REPLY);
        assert_eq!(envelope.error.as_deref(), Some("hopper empty"));
    }

    #[test]
    fn test_timestamp_shapes_are_tolerated() {
        let float = Envelope::from_text(
            r#"{"type":"reply","correlation_id":"req-x","timestamp":1760000000000.0}"#,
        )
        .unwrap();
        assert_eq!(float.timestamp, 1_760_000_000_000);

        let text =
            Envelope::from_text(r#"{"type":"reply","correlation_id":"a","timestamp":"1700"}"#)
                .unwrap();
        assert_eq!(text.timestamp, 1700);

        let junk =
            Envelope::from_text(r#"{"type":"reply","correlation_id":"b","timestamp":"noon"}"#)
                .unwrap();
        assert_eq!(junk.timestamp, 0);

        let null = Envelope::from_text(r#"{"type":"reply","timestamp":null}"#).unwrap();
        assert_eq!(null.timestamp, 0);
    }

    #[test]
    fn test_missing_type_defaults_to_empty() {
        let envelope = Envelope::from_text(r#"{"correlation_id":"req-3","payload":{}}"#).unwrap();
        assert!(envelope.kind.is_empty());
        assert_eq!(envelope.correlation_id.as_deref(), Some("req-3"));
        assert!(Envelope::from_text("[1, 2]").is_err());
    }
}
