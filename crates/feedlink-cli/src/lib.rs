//! Feedlink command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

/// Feedlink - device command and telemetry broker
#[derive(Parser)]
#[command(name = "feedlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (defaults to $FEEDLINK_CONFIG, then ~/.feedlink/feedlink.json5)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker and gateway server
    Serve(commands::serve::ServeArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Query a running gateway's health
    Status(commands::remote::RemoteArgs),

    /// List devices known to a running gateway
    Devices(commands::remote::RemoteArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Status(args) => commands::remote::status(args, config_path).await,
        Commands::Devices(args) => commands::remote::devices(args, config_path).await,
        Commands::Version => {
            println!("feedlink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
