//! Live-session tests over a real WebSocket.

use feedlink_core::Config;
use feedlink_integration_tests::{next_json, wait_for, TestServer};
use futures::SinkExt;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

async fn post(url: String, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("operator request")
}

#[tokio::test]
async fn test_command_round_trip_with_interleaved_telemetry() {
    let server = TestServer::start().await;
    let mut device = server.connect_device("feeder-1").await;

    let operator = tokio::spawn(post(
        server.http_url("/api/devices/feeder-1/command"),
        json!({"command": {"type": "dispense", "grams": 25}}),
    ));

    let request = next_json(&mut device).await.expect("command frame");
    assert_eq!(request["type"], "command");
    assert_eq!(request["payload"]["grams"], 25);
    let correlation_id = request["correlation_id"].as_str().unwrap().to_string();

    device
        .send(Message::Text(
            json!({"type": "telemetry", "payload": {"weight": 300.5}}).to_string(),
        ))
        .await
        .unwrap();
    device
        .send(Message::Text(
            json!({
                "type": "reply",
                "correlation_id": correlation_id,
                "payload": {"dispensed": 25}
            })
            .to_string(),
        ))
        .await
        .unwrap();

    let response = operator.await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["dispensed"], 25);

    let status: Value = reqwest::get(server.http_url("/api/devices/feeder-1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["online"], true);
    assert_eq!(status["transport"], "live");
    assert_eq!(status["telemetry"]["weight"], 300.5);
}

#[tokio::test]
async fn test_offline_device_is_503_immediately() {
    let server = TestServer::start().await;

    let started = Instant::now();
    let response = post(
        server.http_url("/api/devices/nobody/command"),
        json!({"command": {"type": "dispense"}}),
    )
    .await;

    assert_eq!(response.status(), 503);
    assert!(started.elapsed() < Duration::from_secs(2));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "device_offline");
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let mut config = Config::default();
    config.broker.command_timeout_secs = 1;
    let server = TestServer::start_with(config).await;
    let _device = server.connect_device("feeder-1").await;

    let started = Instant::now();
    let response = post(
        server.http_url("/api/devices/feeder-1/command"),
        json!({"command": {"type": "dispense"}}),
    )
    .await;
    let elapsed = started.elapsed();

    assert_eq!(response.status(), 504);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(4));
}

#[tokio::test]
async fn test_reconnect_evicts_previous_session() {
    let server = TestServer::start().await;
    let mut first = server.connect_device("feeder-1").await;
    let first_session = server
        .broker
        .registry()
        .lookup("feeder-1")
        .unwrap()
        .session_id()
        .to_string();

    let _second = tokio_tungstenite::connect_async(server.ws_url("feeder-1"))
        .await
        .unwrap();

    let notice = next_json(&mut first).await.expect("close notice");
    assert_eq!(notice["type"], "close");
    assert_eq!(notice["payload"]["reason"], "replaced by a newer session");

    let broker = server.broker.clone();
    wait_for(move || {
        broker
            .registry()
            .lookup("feeder-1")
            .map(|s| s.session_id() != first_session)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(server.broker.session_count(), 1);
}

#[tokio::test]
async fn test_malformed_frame_closes_session() {
    let server = TestServer::start().await;
    let mut device = server.connect_device("feeder-1").await;

    device
        .send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();

    let broker = server.broker.clone();
    wait_for(move || !broker.is_online("feeder-1")).await;
    assert!(next_json(&mut device).await.is_none());
}

#[tokio::test]
async fn test_discovery_exchange() {
    let server = TestServer::start().await;
    let mut device = server.connect_device("feeder-1").await;

    let url = server.http_url("/api/devices/feeder-1/discover");
    let operator = tokio::spawn(async move { reqwest::get(url).await.unwrap() });

    let request = next_json(&mut device).await.expect("describe frame");
    assert_eq!(request["type"], "describe");
    device
        .send(Message::Text(
            json!({
                "type": "reply",
                "correlation_id": request["correlation_id"],
                "payload": {"component": "scale", "model": "HX711"}
            })
            .to_string(),
        ))
        .await
        .unwrap();

    let response = operator.await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["component"], "scale");
}

#[tokio::test]
async fn test_session_cap_rejects_new_devices() {
    let mut config = Config::default();
    config.gateway.max_sessions = 1;
    let server = TestServer::start_with(config).await;
    let _device = server.connect_device("feeder-1").await;

    assert!(tokio_tungstenite::connect_async(server.ws_url("feeder-2"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_idle_sessions_are_swept() {
    let mut config = Config::default();
    config.broker.session_idle_timeout_secs = 1;
    config.broker.sweep_interval_secs = 1;
    let server = TestServer::start_with(config).await;
    let mut device = server.connect_device("feeder-1").await;

    let notice = next_json(&mut device).await.expect("close notice");
    assert_eq!(notice["payload"]["reason"], "idle timeout");
    assert!(!server.broker.is_online("feeder-1"));
}

#[tokio::test]
async fn test_shutdown_closes_live_sessions() {
    let server = TestServer::start().await;
    let mut device = server.connect_device("feeder-1").await;

    server.stop().await;

    let notice = next_json(&mut device).await.expect("close notice");
    assert_eq!(notice["payload"]["reason"], "server shutting down");
}
