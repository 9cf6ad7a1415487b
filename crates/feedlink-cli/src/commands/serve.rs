//! Serve command.

use clap::Args;
use feedlink_core::config::{BindMode, Config};
use feedlink_gateway::Gateway;
use std::path::Path;
use tracing::info;

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind mode (loopback, lan); overrides the config file
    #[arg(short, long)]
    pub bind: Option<BindMode>,

    /// Port number; overrides the config file and FEEDLINK_PORT
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Resolve the effective configuration for `serve`.
pub fn effective_config(args: &ServeArgs, config_path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    config.validate()?;
    Ok(config)
}

/// Run the serve command.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = effective_config(&args, config_path)?;

    let gateway = Gateway::new(config);
    info!(
        "Feedlink {} listening on {} (command timeout {}s, max sessions {})",
        env!("CARGO_PKG_VERSION"),
        gateway.bind_address(),
        gateway.config().broker.command_timeout_secs,
        gateway.config().gateway.max_sessions,
    );

    gateway.run().await?;
    Ok(())
}
