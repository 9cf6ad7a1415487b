//! Feedlink CLI entry point.

use clap::Parser;
use feedlink_cli::{run, Cli};
use feedlink_core::config::{LogFormat, LoggingConfig};
use feedlink_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it can be read; errors
    // loading it are reported by the command itself.
    let logging = Config::load_or_default(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    run(cli).await
}

fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("feedlink={},tower_http=warn", level).into());

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
