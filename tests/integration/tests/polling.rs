//! Polling transport tests over real HTTP.

use feedlink_integration_tests::TestServer;
use serde_json::{json, Value};

struct PollingDevice {
    client: reqwest::Client,
    base: String,
}

impl PollingDevice {
    fn new(server: &TestServer, device_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: server.http_url(&format!("/api/poll/{}", device_id)),
        }
    }

    async fn post(&self, action: &str, body: Option<Value>) -> (u16, Value) {
        let mut request = self
            .client
            .post(format!("{}/{}", self.base, action))
            .header("x-forwarded-for", "198.51.100.23");
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_hello_upload_next_ack_cycle() {
    let server = TestServer::start().await;
    let device = PollingDevice::new(&server, "dev-a");
    let operator = reqwest::Client::new();

    let (status, hello) = device.post("hello", None).await;
    assert_eq!(status, 200);
    assert_eq!(hello["address"], "198.51.100.23");

    let (status, _) = device
        .post("upload", Some(json!({"telemetry": {"weight": 511.0, "temp": 22.5}})))
        .await;
    assert_eq!(status, 200);

    for id in ["c1", "c2"] {
        let response = operator
            .post(server.http_url("/api/devices/dev-a/command"))
            .json(&json!({"command": {"id": id, "type": "dispense", "grams": 20}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
    }

    let (status, next) = device.post("next", None).await;
    assert_eq!(status, 200);
    let ids: Vec<&str> = next["commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c1", "c2"]);

    let (_, next) = device.post("next", None).await;
    assert_eq!(next["commands"], json!([]));

    let (_, ack) = device.post("ack", Some(json!({"command_id": "c1"}))).await;
    assert_eq!(ack["acknowledged"], true);
    let (status, ack) = device.post("ack", Some(json!({"command_id": "c1"}))).await;
    assert_eq!(status, 200);
    assert_eq!(ack["acknowledged"], false);

    let listing: Value = reqwest::get(server.http_url("/api/devices"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = &listing["devices"][0];
    assert_eq!(entry["device_id"], "dev-a");
    assert_eq!(entry["online"], false);
    assert_eq!(entry["transport"], "poll");
    assert_eq!(entry["in_flight"], 1);
    assert_eq!(entry["telemetry"]["weight"], 511.0);
}

#[tokio::test]
async fn test_get_next_for_unknown_device_is_empty() {
    let server = TestServer::start().await;
    let next: Value = reqwest::get(server.http_url("/api/poll/fresh/next"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(next["commands"], json!([]));
    assert!(server.broker.is_known("fresh"));
}

#[tokio::test]
async fn test_health_reports_counts() {
    let server = TestServer::start().await;
    PollingDevice::new(&server, "dev-b").post("hello", None).await;

    let health: Value = reqwest::get(server.http_url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["known_devices"], 1);
    assert_eq!(health["live_sessions"], 0);
}
