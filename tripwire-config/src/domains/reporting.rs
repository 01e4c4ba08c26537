//! Error reporting configuration

use crate::error::ConfigResult;
use crate::validation::{validate_unit_interval, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery timeout used when none (or zero) is configured
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings for the error-collection service the interceptor reports to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Endpoint identifier of the collection service (a DSN for Sentry).
    /// The interceptor refuses to build without one.
    pub service_address: String,

    /// Fraction of events forwarded by the collector, in `[0, 1]`
    pub sample_rate: f32,

    /// Block the panicking request until the event is flushed
    pub wait_for_delivery: bool,

    /// Upper bound on the flush wait
    #[serde(with = "humantime_serde")]
    pub delivery_timeout: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            service_address: String::new(),
            sample_rate: 1.0,
            wait_for_delivery: false,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

impl ReportingConfig {
    /// Create a configuration pointing at the given service address
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
            ..Self::default()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_wait_for_delivery(mut self, wait: bool) -> Self {
        self.wait_for_delivery = wait;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Delivery timeout with the zero value replaced by the default
    pub fn effective_delivery_timeout(&self) -> Duration {
        if self.delivery_timeout.is_zero() {
            DEFAULT_DELIVERY_TIMEOUT
        } else {
            self.delivery_timeout
        }
    }

    /// Whether a service address has been supplied
    pub fn has_service_address(&self) -> bool {
        !self.service_address.trim().is_empty()
    }
}

impl Validatable for ReportingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_unit_interval(self.sample_rate, "sample_rate", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "reporting"
    }
}
