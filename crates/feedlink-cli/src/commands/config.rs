//! Configuration management commands.

use clap::Args;
use feedlink_core::config::Config;
use feedlink_core::paths;
use feedlink_core::ConfigError;
use std::path::Path;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file, defaults and environment overrides)
    Show,

    /// Validate the configuration file
    Validate,

    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::load_or_default(config_path)?;
            println!("{}", config.to_json5()?);
        }

        ConfigCommand::Validate => {
            let path = paths::resolve_config_file(config_path)?;
            let config = Config::load(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            println!("Configuration is valid: {}", path.display());
        }

        ConfigCommand::Init { force } => {
            let path = init(config_path, force)?;
            println!("Created config file: {}", path.display());
        }

        ConfigCommand::Path => {
            let path = paths::resolve_config_file(config_path)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

/// Write the default configuration, refusing to clobber an existing file
/// unless `force` is set.
pub fn init(config_path: Option<&Path>, force: bool) -> anyhow::Result<std::path::PathBuf> {
    let path = paths::resolve_config_file(config_path)?;
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists(path).into());
    }
    Config::default().save(&path)?;
    Ok(path)
}
