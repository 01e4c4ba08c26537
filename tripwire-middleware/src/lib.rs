//! Request-scoped panic recovery and error reporting middleware
//!
//! [`PanicInterceptor`] is a `tower` layer that wraps every downstream stage of
//! an axum application. For each request it:
//!
//! - isolates a reporting scope from the shared [`ErrorCollector`] and stores it
//!   in the request extensions as a [`RequestScope`]
//! - catches any panic raised while handling the request
//! - drops client-disconnect panics (broken pipe, connection reset) from
//!   reporting and forwards everything else to the collector
//! - optionally waits, bounded by the delivery timeout, for the event to leave
//!   the process
//! - hands the panic to the configured fallback handler, or resumes the unwind
//!
//! ## Example
//!
//! Requires the `testing` feature for the in-memory collector.
//!
//! ```rust,no_run
//! use axum::{http::StatusCode, routing::get, Router};
//! use tripwire_middleware::{testing::MemoryCollector, PanicInterceptor, ReportingConfig, RequestScope};
//!
//! async fn checkout(scope: RequestScope) -> &'static str {
//!     scope.set_tag("feature", "checkout");
//!     "ok"
//! }
//!
//! # fn main() -> Result<(), tripwire_middleware::ConfigurationError> {
//! let interceptor = PanicInterceptor::builder(ReportingConfig::new("https://key@errors.example.com/1"))
//!     .panic_handler(|_context, error| (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
//!     .build(MemoryCollector::new())?;
//!
//! let app: Router = Router::new()
//!     .route("/checkout", get(checkout))
//!     .layer(interceptor);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod collector;
pub mod error;
pub mod layer;
pub mod recovery;
pub mod scope;

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(feature = "sentry")]
pub mod sentry_collector;

// Re-export commonly used types
pub use classify::{is_suppressed, PanicValue};
pub use collector::{CollectorError, CollectorOptions, ErrorCollector, EventId, ReportingScope};
pub use error::{ConfigurationError, PanicError};
pub use layer::{InterceptorBuilder, PanicInterceptor, PanicInterceptorService};
pub use recovery::{PanicHandler, Recovery};
pub use scope::{
    derive_scope, lookup_scope, MissingScope, RequestContext, RequestMetadata, RequestScope, RequestScopeExt,
    SCOPE_KEY,
};
pub use tripwire_config::ReportingConfig;

#[cfg(feature = "sentry")]
pub use sentry_collector::SentryCollector;
