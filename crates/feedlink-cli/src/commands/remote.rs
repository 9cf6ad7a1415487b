//! Commands that query a running gateway over HTTP.

use clap::Args;
use feedlink_core::config::Config;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Arguments for commands that talk to a running gateway.
#[derive(Args)]
pub struct RemoteArgs {
    /// Gateway base URL (defaults to the configured local port)
    #[arg(long)]
    pub url: Option<String>,

    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

fn base_url(args: &RemoteArgs, config_path: Option<&Path>) -> anyhow::Result<String> {
    if let Some(url) = &args.url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let config = Config::load_or_default(config_path)?;
    Ok(format!("http://127.0.0.1:{}", config.gateway.port))
}

async fn get_json(url: &str) -> anyhow::Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Gateway not reachable at {}: {}", url, e))?;

    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        let message = body["error"]["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("Gateway returned {}: {}", status, message);
    }
    Ok(body)
}

/// `feedlink status`
pub async fn status(args: RemoteArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let base = base_url(&args, config_path)?;
    let health = get_json(&format!("{}/health", base)).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!("Gateway at {} is {}", base, health["status"].as_str().unwrap_or("unknown"));
    println!("  version:        {}", health["version"].as_str().unwrap_or("-"));
    println!("  uptime:         {}s", health["uptime_seconds"]);
    println!("  live sessions:  {}", health["live_sessions"]);
    println!("  known devices:  {}", health["known_devices"]);
    Ok(())
}

/// `feedlink devices`
pub async fn devices(args: RemoteArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let base = base_url(&args, config_path)?;
    let listing = get_json(&format!("{}/api/devices", base)).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let devices = listing["devices"].as_array().cloned().unwrap_or_default();
    if devices.is_empty() {
        println!("No devices known.");
        return Ok(());
    }
    for line in format_device_table(&devices) {
        println!("{}", line);
    }
    Ok(())
}

/// Render a device listing as aligned text rows, header first.
pub fn format_device_table(devices: &[Value]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<24} {:<8} {:<6} {:>6} {:>9}  {}",
        "DEVICE", "STATE", "VIA", "QUEUE", "IN-FLIGHT", "LAST SEEN"
    )];

    for device in devices {
        let state = if device["online"].as_bool().unwrap_or(false) {
            "online"
        } else {
            "offline"
        };
        lines.push(format!(
            "{:<24} {:<8} {:<6} {:>6} {:>9}  {}",
            device["device_id"].as_str().unwrap_or("?"),
            state,
            device["transport"].as_str().unwrap_or("-"),
            device["queue_length"].as_u64().unwrap_or(0),
            device["in_flight"].as_u64().unwrap_or(0),
            device["last_seen"].as_str().unwrap_or("never"),
        ));
    }
    lines
}
