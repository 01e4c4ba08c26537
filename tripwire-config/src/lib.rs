//! Domain-driven configuration management for Tripwire
//!
//! This crate provides modular configuration split by functional domains
//! (error reporting, logging, demo server), with validation, defaults,
//! and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    logging::{LogFormat, LogLevel, LoggingConfig},
    reporting::{ReportingConfig, DEFAULT_DELIVERY_TIMEOUT},
    server::ServerConfig,
    TripwireConfig,
};
