//! Config save/load roundtrip integration tests.

use feedlink_core::config::{BindMode, Config, ConfigBuilder, LogFormat};
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feedlink.json5");

    let config = ConfigBuilder::new()
        .port(9200)
        .bind(BindMode::Lan)
        .command_timeout_secs(3)
        .session_idle_timeout_secs(0)
        .build();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, 9200);
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert_eq!(loaded.broker.command_timeout_secs, 3);
    assert!(loaded.broker.session_idle_timeout().is_none());
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_handwritten_json5_with_comments() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feedlink.json5");
    std::fs::write(
        &path,
        r#"{
            // feeders in the barn dial in over the LAN
            gateway: { bind: "lan", max_sessions: 16 },
            broker: { discovery_timeout_secs: 2, },
            logging: { format: "json" },
        }"#,
    )
    .unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert_eq!(loaded.gateway.max_sessions, 16);
    assert_eq!(loaded.gateway.port, 8787);
    assert_eq!(loaded.broker.discovery_timeout_secs, 2);
    assert_eq!(loaded.logging.format, LogFormat::Json);
}

#[test]
fn test_load_or_default_requires_explicit_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.json5");
    assert!(Config::load_or_default(Some(&missing)).is_err());
}
