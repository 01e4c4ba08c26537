//! Structured logging infrastructure for Tripwire
//!
//! Everything in the workspace logs through `tracing`; this crate installs the
//! global subscriber from a [`LoggingConfig`]:
//! - env-filter driven levels, with `RUST_LOG` as a fallback
//! - text, compact, pretty or JSON output
//! - optional source locations

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
pub use tripwire_config::{LogFormat, LogLevel, LoggingConfig};
