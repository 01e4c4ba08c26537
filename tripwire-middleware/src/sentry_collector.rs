//! Sentry-backed error collector
//!
//! The client is created once in [`ErrorCollector::init`] and bound to a root
//! hub owned by the collector. Every request gets a hub cloned from that root,
//! so tags and the attached request never leak between requests. The panic
//! integration is not installed: panics reach Sentry only through the
//! interceptor.

use once_cell::sync::OnceCell;
use sentry::protocol::{self, Event, Exception, Level, Mechanism};
use sentry::types::Dsn;
use sentry::{Breadcrumb, Client, ClientOptions, Hub, Scope};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::classify::PanicValue;
use crate::collector::{CollectorError, CollectorOptions, ErrorCollector, EventId, ReportingScope};
use crate::scope::RequestMetadata;

/// Time given to the transport to drain when the collector is dropped
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Mechanism recorded on every exception raised from a recovered panic
const PANIC_MECHANISM: &str = "panic";

/// [`ErrorCollector`] reporting to Sentry
pub struct SentryCollector {
    root: OnceCell<Arc<Hub>>,
    release: Option<String>,
    environment: Option<String>,
}

impl SentryCollector {
    pub fn new() -> Self {
        Self {
            root: OnceCell::new(),
            release: None,
            environment: None,
        }
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.root.get().is_some()
    }
}

impl Default for SentryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCollector for SentryCollector {
    fn init(&self, options: &CollectorOptions) -> Result<(), CollectorError> {
        let dsn: Dsn = options
            .service_address
            .parse::<Dsn>()
            .map_err(|e| CollectorError::InvalidAddress {
                address: options.service_address.clone(),
                reason: e.to_string(),
            })?;

        if self.is_initialized() {
            return Err(CollectorError::AlreadyInitialized);
        }

        let client_options = ClientOptions {
            dsn: Some(dsn),
            sample_rate: options.sample_rate,
            release: self.release.clone().map(Into::into),
            environment: self.environment.clone().map(Into::into),
            ..Default::default()
        };
        let client = Arc::new(Client::from_config(sentry::apply_defaults(client_options)));
        let hub = Arc::new(Hub::new(Some(client), Arc::new(Scope::default())));

        self.root
            .set(hub)
            .map_err(|_| CollectorError::AlreadyInitialized)?;

        info!(sample_rate = options.sample_rate, "Sentry client initialized");
        Ok(())
    }

    fn isolate(&self) -> Arc<dyn ReportingScope> {
        let hub = match self.root.get() {
            Some(root) => Hub::new_from_top(root),
            None => Hub::new(None, Arc::new(Scope::default())),
        };
        Arc::new(SentryScope { hub: Arc::new(hub) })
    }
}

impl Drop for SentryCollector {
    fn drop(&mut self) {
        if let Some(client) = self.root.get().and_then(|hub| hub.client()) {
            let drained = client.close(Some(SHUTDOWN_TIMEOUT));
            debug!(drained, "Sentry client closed");
        }
    }
}

/// Per-request Sentry hub
struct SentryScope {
    hub: Arc<Hub>,
}

impl ReportingScope for SentryScope {
    fn tag_request(&self, request: &RequestMetadata) {
        let sentry_request = sentry_request(request);
        let method = request.method().to_string();
        let path = request.path().to_string();

        self.hub.configure_scope(move |scope| {
            scope.set_tag("http.method", method);
            scope.set_transaction(Some(path.as_str()));
            scope.add_event_processor(move |mut event| {
                if event.request.is_none() {
                    event.request = Some(sentry_request.clone());
                }
                Some(event)
            });
        });
    }

    fn set_tag(&self, key: &str, value: &str) {
        self.hub.configure_scope(|scope| scope.set_tag(key, value));
    }

    fn add_breadcrumb(&self, category: &str, message: &str) {
        self.hub.add_breadcrumb(Breadcrumb {
            category: Some(category.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        });
    }

    fn capture(&self, request: &RequestMetadata, panic: &PanicValue<'_>) -> Option<EventId> {
        let mut event = panic_event(panic);
        event.request = Some(sentry_request(request));

        let event_id = self.hub.capture_event(event);
        (!event_id.is_nil()).then_some(event_id)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.hub
            .client()
            .map(|client| client.flush(Some(timeout)))
            .unwrap_or(false)
    }
}

fn panic_mechanism() -> Mechanism {
    Mechanism {
        ty: PANIC_MECHANISM.to_string(),
        handled: Some(false),
        ..Default::default()
    }
}

fn panic_event(panic: &PanicValue<'_>) -> Event<'static> {
    let mut event = match panic.as_error() {
        Some(error) => {
            let mut event = sentry::event_from_error(error);
            if let Some(exception) = event.exception.values.last_mut() {
                exception.mechanism = Some(panic_mechanism());
            }
            event
        }
        None => Event {
            exception: vec![Exception {
                ty: PANIC_MECHANISM.to_string(),
                value: Some(panic.message()),
                mechanism: Some(panic_mechanism()),
                ..Default::default()
            }]
            .into(),
            ..Default::default()
        },
    };

    event.level = Level::Fatal;
    event
        .tags
        .insert("panic.kind".to_string(), panic.kind().to_string());
    event
}

fn sentry_request(request: &RequestMetadata) -> protocol::Request {
    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    protocol::Request {
        url: request
            .absolute_url()
            .and_then(|url| url::Url::parse(&url).ok()),
        method: Some(request.method().to_string()),
        query_string: request.uri().query().map(str::to_string),
        headers,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Request};
    use std::any::Any;
    use std::io;

    fn options(address: &str, sample_rate: f32) -> CollectorOptions {
        CollectorOptions {
            service_address: address.to_string(),
            sample_rate,
        }
    }

    fn metadata() -> RequestMetadata {
        let request = Request::builder()
            .method("PUT")
            .uri("/accounts/42?dry_run=true")
            .header(header::HOST, "billing.internal")
            .header(header::USER_AGENT, "probe/1.0")
            .body(())
            .unwrap();
        RequestMetadata::from_request(&request)
    }

    #[test]
    fn test_invalid_dsn_is_rejected() {
        let collector = SentryCollector::new();
        let result = collector.init(&options("not a dsn", 1.0));

        assert!(matches!(result, Err(CollectorError::InvalidAddress { .. })));
        assert!(!collector.is_initialized());
    }

    #[test]
    fn test_second_init_fails() {
        let collector = SentryCollector::new().with_environment("test");
        collector
            .init(&options("https://public@sentry.invalid/1", 0.0))
            .unwrap();

        assert!(collector.is_initialized());
        assert!(matches!(
            collector.init(&options("https://public@sentry.invalid/1", 0.0)),
            Err(CollectorError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_uninitialized_scope_drops_events() {
        let collector = SentryCollector::new();
        let scope = collector.isolate();
        scope.tag_request(&metadata());

        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert!(scope
            .capture(&metadata(), &PanicValue::classify(payload.as_ref()))
            .is_none());
        assert!(!scope.flush(Duration::from_millis(10)));
    }

    #[test]
    fn test_sampled_out_events_have_no_id() {
        let collector = SentryCollector::new();
        collector
            .init(&options("https://public@sentry.invalid/1", 0.0))
            .unwrap();

        let scope = collector.isolate();
        let payload: Box<dyn Any + Send> = Box::new(String::from("db unavailable"));
        assert!(scope
            .capture(&metadata(), &PanicValue::classify(payload.as_ref()))
            .is_none());
    }

    #[test]
    fn test_message_event_shape() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let event = panic_event(&PanicValue::classify(payload.as_ref()));

        assert_eq!(event.level, Level::Fatal);
        assert_eq!(event.tags.get("panic.kind").map(String::as_str), Some("message"));
        let exception = &event.exception.values[0];
        assert_eq!(exception.ty, "panic");
        assert_eq!(exception.value.as_deref(), Some("boom"));
        assert_eq!(exception.mechanism.as_ref().and_then(|m| m.handled), Some(false));
    }

    #[test]
    fn test_error_event_keeps_error_chain() {
        let payload: Box<dyn Any + Send> = Box::new(io::Error::new(io::ErrorKind::Other, "disk full"));
        let event = panic_event(&PanicValue::classify(payload.as_ref()));

        let exception = event.exception.values.last().unwrap();
        assert_eq!(exception.value.as_deref(), Some("disk full"));
        assert_eq!(exception.mechanism.as_ref().map(|m| m.ty.as_str()), Some("panic"));
        assert_eq!(event.tags.get("panic.kind").map(String::as_str), Some("error"));
    }

    #[test]
    fn test_request_conversion() {
        let request = sentry_request(&metadata());

        assert_eq!(request.method.as_deref(), Some("PUT"));
        assert_eq!(request.query_string.as_deref(), Some("dry_run=true"));
        assert_eq!(
            request.url.map(|url| url.to_string()).as_deref(),
            Some("http://billing.internal/accounts/42?dry_run=true")
        );
        assert_eq!(request.headers.get("user-agent").map(String::as_str), Some("probe/1.0"));
    }
}
