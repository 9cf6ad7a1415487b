//! Configuration loading and persistence.

use super::{BindMode, Config, LogLevel};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;
use tracing::debug;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5.
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load the resolved config file (explicit path, `$FEEDLINK_CONFIG`, then the
    /// default location), falling back to defaults when no file exists, then apply
    /// environment overrides.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = paths::resolve_config_file(explicit)?;
        let mut config = match Self::load(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) if explicit.is_none() => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `FEEDLINK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env::get_u16(env::vars::FEEDLINK_PORT) {
            self.gateway.port = port;
        }
        if let Some(secs) = env::get_u64(env::vars::FEEDLINK_SESSION_IDLE_SECS) {
            self.broker.session_idle_timeout_secs = secs;
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }
        if self.gateway.max_sessions == 0 {
            errors.push("Gateway max_sessions must be greater than 0".to_string());
        }

        let broker = &self.broker;
        if broker.command_timeout_secs == 0 {
            errors.push("Broker command_timeout_secs must be greater than 0".to_string());
        }
        if broker.discovery_timeout_secs == 0 {
            errors.push("Broker discovery_timeout_secs must be greater than 0".to_string());
        }
        if broker.max_request_timeout_secs < broker.command_timeout_secs {
            errors.push(format!(
                "Broker max_request_timeout_secs ({}) is below command_timeout_secs ({})",
                broker.max_request_timeout_secs, broker.command_timeout_secs
            ));
        }
        if broker.session_idle_timeout_secs > 0 && broker.sweep_interval_secs == 0 {
            errors.push(
                "Broker sweep_interval_secs must be greater than 0 when idle sweeping is enabled"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

/// Configuration builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gateway port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.gateway.port = port;
        self
    }

    /// Set the bind mode.
    pub fn bind(mut self, mode: BindMode) -> Self {
        self.config.gateway.bind = mode;
        self
    }

    /// Set the default command timeout.
    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.broker.command_timeout_secs = secs;
        self
    }

    /// Set the live-session idle timeout (0 disables the sweeper).
    pub fn session_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.broker.session_idle_timeout_secs = secs;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json5_with_comments() {
        let config = Config::parse(
            r#"{
                // feeders dial in from the barn network
                gateway: { bind: "lan", port: 9000 },
                broker: { command_timeout_secs: 4, },
            }"#,
        )
        .unwrap();
        assert_eq!(config.gateway.bind, BindMode::Lan);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.broker.command_timeout_secs, 4);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            Config::parse("not valid json"),
            Err(ConfigError::Json5(_))
        ));
    }

    #[test]
    fn test_validate_default_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.gateway.port = 0;
        config.broker.command_timeout_secs = 0;
        config.broker.sweep_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("port cannot be 0"));
        assert!(err.contains("command_timeout_secs"));
        assert!(err.contains("sweep_interval_secs"));
    }

    #[test]
    fn test_validate_max_below_command_timeout() {
        let config = ConfigBuilder::new().command_timeout_secs(120).build();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_request_timeout_secs"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("feedlink.json5");

        let config = ConfigBuilder::new()
            .port(9191)
            .session_idle_timeout_secs(0)
            .build();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gateway.port, 9191);
        assert_eq!(loaded.broker.session_idle_timeout_secs, 0);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_or_default_explicit_missing_is_error() {
        let result = Config::load_or_default(Some(Path::new("/nonexistent/feedlink.json5")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
