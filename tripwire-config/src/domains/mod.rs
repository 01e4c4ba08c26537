//! Domain-specific configuration modules

pub mod logging;
pub mod reporting;
pub mod server;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Tripwire configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TripwireConfig {
    /// Error reporting configuration
    #[serde(default)]
    pub reporting: reporting::ReportingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Server configuration (optional, for the demo server)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<server::ServerConfig>,
}

impl TripwireConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.reporting.validate()?;
        self.logging.validate()?;

        if let Some(ref server) = self.server {
            server.validate()?;
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TripwireConfig {
            server: Some(server::ServerConfig::default()),
            ..TripwireConfig::default()
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
