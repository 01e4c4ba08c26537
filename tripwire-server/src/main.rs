//! Tripwire demo server binary
//!
//! Runs a small axum application behind the panic interceptor, reporting to
//! the configured Sentry DSN.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use tripwire_config::{ConfigLoader, LogLevel, ServerConfig, TripwireConfig};
use tripwire_logging::init_logging_from_config;
use tripwire_middleware::SentryCollector;
use tripwire_server::{build_interceptor, router, serve};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (YAML or JSON); the environment is used otherwise
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server bind address, overrides the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Server port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Error-collection service address (Sentry DSN)
    #[arg(long, value_name = "DSN")]
    service_address: Option<String>,

    /// Block panicking requests until the event is delivered
    #[arg(long)]
    wait_for_delivery: bool,

    /// Upper bound on the delivery wait, e.g. `500ms` or `2s`
    #[arg(long, value_parser = humantime_duration)]
    delivery_timeout: Option<Duration>,

    /// Log level, overrides the configuration
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", TripwireConfig::generate_sample());
        return Ok(());
    }

    let mut config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, &cli);

    init_logging_from_config(&config.logging)?;

    let collector = SentryCollector::new()
        .with_release(concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION")));
    let interceptor = build_interceptor(&config.reporting, collector)?;

    let server = config.server.unwrap_or_default();
    tracing::info!(
        wait_for_delivery = interceptor.wait_for_delivery(),
        delivery_timeout = ?interceptor.delivery_timeout(),
        "Starting tripwire demo server on {}",
        server.socket_address()
    );

    serve(router(interceptor), &server.socket_address()).await
}

/// Apply CLI argument overrides to configuration
fn apply_cli_overrides(config: &mut TripwireConfig, cli: &Cli) {
    if cli.bind.is_some() || cli.port.is_some() {
        let server = config.server.get_or_insert_with(ServerConfig::default);
        if let Some(bind) = &cli.bind {
            server.bind_address = bind.clone();
        }
        if let Some(port) = cli.port {
            server.port = port;
        }
    }

    if let Some(address) = &cli.service_address {
        config.reporting.service_address = address.clone();
    }
    if cli.wait_for_delivery {
        config.reporting.wait_for_delivery = true;
    }
    if let Some(timeout) = cli.delivery_timeout {
        config.reporting.delivery_timeout = timeout;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
}

fn humantime_duration(value: &str) -> Result<Duration, String> {
    value
        .parse::<humantime::Duration>()
        .map(Into::into)
        .map_err(|e| e.to_string())
}
