//! Contract with the external error-collection service
//!
//! The interceptor never talks to the service directly. It initializes an
//! [`ErrorCollector`] once at startup and asks it for an isolated
//! [`ReportingScope`] per request; everything the interceptor reports goes
//! through that scope.

use crate::classify::PanicValue;
use crate::scope::RequestMetadata;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Identifier the collection service assigns to a captured event
pub type EventId = Uuid;

/// Options passed to [`ErrorCollector::init`]
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorOptions {
    pub service_address: String,
    pub sample_rate: f32,
}

/// Failures raised by a collector
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Invalid service address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Error collector is already initialized")]
    AlreadyInitialized,

    #[error("Error collector backend failure: {0}")]
    Backend(String),
}

/// Process-wide handle to the error-collection service.
///
/// `init` runs once, before any request is served. After that the collector
/// is only read: `isolate` must not change state visible to other scopes.
pub trait ErrorCollector: Send + Sync + 'static {
    /// Connect the collector to the service
    fn init(&self, options: &CollectorOptions) -> Result<(), CollectorError>;

    /// Clone the shared client state into a fresh per-request scope
    fn isolate(&self) -> Arc<dyn ReportingScope>;
}

/// Reporting state owned by a single request
pub trait ReportingScope: Send + Sync + 'static {
    /// Attach the inbound request to every event raised from this scope
    fn tag_request(&self, request: &RequestMetadata);

    fn set_tag(&self, key: &str, value: &str);

    fn add_breadcrumb(&self, category: &str, message: &str);

    /// Report a panic. `None` when the event was dropped (sampling, no client).
    fn capture(&self, request: &RequestMetadata, panic: &PanicValue<'_>) -> Option<EventId>;

    /// Block until queued events are sent or `timeout` elapses; true when drained
    fn flush(&self, timeout: Duration) -> bool;
}

impl<C: ErrorCollector + ?Sized> ErrorCollector for Arc<C> {
    fn init(&self, options: &CollectorOptions) -> Result<(), CollectorError> {
        (**self).init(options)
    }

    fn isolate(&self) -> Arc<dyn ReportingScope> {
        (**self).isolate()
    }
}
