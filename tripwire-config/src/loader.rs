//! Configuration loading and environment variable handling

use crate::domains::TripwireConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TRIPWIRE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML or JSON file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TripwireConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: TripwireConfig = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TripwireConfig> {
        let mut config = TripwireConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TripwireConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut TripwireConfig) -> ConfigResult<()> {
        self.apply_reporting_overrides(&mut config.reporting)?;
        self.apply_logging_overrides(&mut config.logging)?;

        // A bind address or port in the environment implies server mode
        if self.get_env_var("SERVER_BIND_ADDRESS").is_ok() || self.get_env_var("SERVER_PORT").is_ok() {
            let server = config.server.get_or_insert_with(Default::default);
            self.apply_server_overrides(server)?;
        }

        Ok(())
    }

    /// Apply error reporting overrides
    fn apply_reporting_overrides(
        &self,
        config: &mut crate::domains::reporting::ReportingConfig,
    ) -> ConfigResult<()> {
        if let Ok(address) = self.get_env_var("SERVICE_ADDRESS") {
            config.service_address = address;
        }

        if let Ok(rate) = self.get_env_var("SAMPLE_RATE") {
            config.sample_rate = rate
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SAMPLE_RATE: {}", e)))?;
        }

        if let Ok(wait) = self.get_env_var("WAIT_FOR_DELIVERY") {
            config.wait_for_delivery = wait
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid WAIT_FOR_DELIVERY: {}", e)))?;
        }

        if let Ok(timeout) = self.get_env_var("DELIVERY_TIMEOUT") {
            config.delivery_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::EnvError(format!("Invalid DELIVERY_TIMEOUT: {}", e)))?;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Apply server config overrides
    fn apply_server_overrides(
        &self,
        config: &mut crate::domains::server::ServerConfig,
    ) -> ConfigResult<()> {
        if let Ok(bind) = self.get_env_var("SERVER_BIND_ADDRESS") {
            config.bind_address = bind;
        }

        if let Ok(port) = self.get_env_var("SERVER_PORT") {
            config.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SERVER_PORT: {}", e)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
