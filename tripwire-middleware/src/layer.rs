//! Tower layer installing the panic interceptor in front of a service

use axum::{
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::info;

use crate::collector::{CollectorOptions, ErrorCollector};
use crate::error::{ConfigurationError, PanicError};
use crate::recovery::{PanicHandler, Recovery};
use crate::scope::{self, RequestContext, RequestMetadata, RequestScope};
use tripwire_config::ReportingConfig;

/// Builder for [`PanicInterceptor`]
pub struct InterceptorBuilder {
    config: ReportingConfig,
    panic_handler: Option<PanicHandler>,
}

impl InterceptorBuilder {
    pub fn new(config: ReportingConfig) -> Self {
        Self {
            config,
            panic_handler: None,
        }
    }

    /// Handle recovered panics instead of resuming them.
    ///
    /// The handler's response is returned to the client.
    pub fn panic_handler<F, R>(mut self, handler: F) -> Self
    where
        F: Fn(&RequestContext, PanicError) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.panic_handler = Some(Arc::new(move |context: &RequestContext, error: PanicError| {
            handler(context, error).into_response()
        }));
        self
    }

    /// Validate the configuration, initialize the collector and build the layer
    pub fn build<C: ErrorCollector>(self, collector: C) -> Result<PanicInterceptor, ConfigurationError> {
        let config = self.config;

        if !config.has_service_address() {
            return Err(ConfigurationError::MissingServiceAddress);
        }
        if !(0.0..=1.0).contains(&config.sample_rate) {
            return Err(ConfigurationError::InvalidSampleRate(config.sample_rate));
        }

        let options = CollectorOptions {
            service_address: config.service_address.trim().to_string(),
            sample_rate: config.sample_rate,
        };
        collector
            .init(&options)
            .map_err(ConfigurationError::Initialization)?;

        let mut recovery = Recovery::new(config.wait_for_delivery, config.effective_delivery_timeout());
        if let Some(handler) = self.panic_handler {
            recovery = recovery.with_panic_handler(handler);
        }

        info!(
            sample_rate = config.sample_rate,
            wait_for_delivery = recovery.wait_for_delivery(),
            delivery_timeout = ?recovery.delivery_timeout(),
            repanic = recovery.repanics(),
            "Panic interceptor initialized"
        );

        Ok(PanicInterceptor {
            shared: Arc::new(Shared {
                collector: Arc::new(collector),
                recovery,
            }),
        })
    }
}

struct Shared {
    collector: Arc<dyn ErrorCollector>,
    recovery: Recovery,
}

/// Layer that recovers panics from the wrapped service and reports them
#[derive(Clone)]
pub struct PanicInterceptor {
    shared: Arc<Shared>,
}

impl PanicInterceptor {
    pub fn builder(config: ReportingConfig) -> InterceptorBuilder {
        InterceptorBuilder::new(config)
    }

    /// Build an interceptor that resumes every recovered panic
    pub fn build<C: ErrorCollector>(config: ReportingConfig, collector: C) -> Result<Self, ConfigurationError> {
        InterceptorBuilder::new(config).build(collector)
    }

    pub fn repanics(&self) -> bool {
        self.shared.recovery.repanics()
    }

    pub fn wait_for_delivery(&self) -> bool {
        self.shared.recovery.wait_for_delivery()
    }

    pub fn delivery_timeout(&self) -> Duration {
        self.shared.recovery.delivery_timeout()
    }

    /// Isolate a fresh scope for the given request
    pub fn derive_scope(&self, request: &RequestMetadata) -> RequestScope {
        scope::derive_scope(self.shared.collector.as_ref(), request)
    }
}

impl std::fmt::Debug for PanicInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicInterceptor")
            .field("recovery", &self.shared.recovery)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for PanicInterceptor {
    type Service = PanicInterceptorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicInterceptorService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Service produced by [`PanicInterceptor`]
#[derive(Clone)]
pub struct PanicInterceptorService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, B> Service<Request<B>> for PanicInterceptorService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let metadata = RequestMetadata::from_request(&request);
        let scope = scope::derive_scope(self.shared.collector.as_ref(), &metadata);
        request.extensions_mut().insert(scope.clone());
        let context = RequestContext::new(metadata, scope);

        // The ready service is the one that must handle this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let called = panic::catch_unwind(AssertUnwindSafe(|| inner.call(request)));
        let shared = Arc::clone(&self.shared);

        async move {
            let outcome = match called {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(payload) => Err(payload),
            };
            shared.recovery.settle(&context, outcome).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCollector;
    use axum::http::StatusCode;

    #[test]
    fn test_empty_address_never_initializes() {
        let collector = MemoryCollector::new();
        let result = PanicInterceptor::build(ReportingConfig::new("   "), collector.clone());

        assert!(matches!(result, Err(ConfigurationError::MissingServiceAddress)));
        assert!(collector.init_calls().is_empty());
    }

    #[test]
    fn test_sample_rate_is_checked_before_init() {
        let collector = MemoryCollector::new();
        let config = ReportingConfig::new("https://key@errors.example.com/1").with_sample_rate(1.5);
        let result = PanicInterceptor::build(config, collector.clone());

        assert!(matches!(result, Err(ConfigurationError::InvalidSampleRate(rate)) if rate == 1.5));
        assert!(collector.init_calls().is_empty());
    }

    #[test]
    fn test_init_receives_options() {
        let collector = MemoryCollector::new();
        let config = ReportingConfig::new(" https://key@errors.example.com/1 ").with_sample_rate(0.25);
        PanicInterceptor::build(config, collector.clone()).unwrap();

        assert_eq!(
            collector.init_calls(),
            vec![CollectorOptions {
                service_address: "https://key@errors.example.com/1".to_string(),
                sample_rate: 0.25,
            }]
        );
    }

    #[test]
    fn test_init_failure_is_propagated() {
        let collector = MemoryCollector::new().failing_init("dsn rejected");
        let result = PanicInterceptor::build(ReportingConfig::new("https://key@errors.example.com/1"), collector);

        match result {
            Err(ConfigurationError::Initialization(error)) => {
                assert!(error.to_string().contains("dsn rejected"))
            }
            other => panic!("expected initialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = ReportingConfig::new("https://key@errors.example.com/1")
            .with_wait_for_delivery(true)
            .with_delivery_timeout(Duration::ZERO);
        let interceptor = PanicInterceptor::builder(config)
            .panic_handler(|_context, _error| StatusCode::INTERNAL_SERVER_ERROR)
            .build(MemoryCollector::new())
            .unwrap();

        assert_eq!(interceptor.delivery_timeout(), Duration::from_secs(2));
        assert!(interceptor.wait_for_delivery());
        assert!(!interceptor.repanics());
    }

    #[test]
    fn test_unbounded_timeout_is_kept_whole() {
        let config = ReportingConfig::new("https://key@errors.example.com/1")
            .with_wait_for_delivery(true)
            .with_delivery_timeout(Duration::MAX);
        let interceptor = PanicInterceptor::build(config, MemoryCollector::new()).unwrap();

        assert_eq!(interceptor.delivery_timeout(), Duration::MAX);
    }

    #[test]
    fn test_interceptor_derives_distinct_scopes() {
        let collector = MemoryCollector::new();
        let interceptor =
            PanicInterceptor::build(ReportingConfig::new("https://key@errors.example.com/1"), collector.clone())
                .unwrap();
        assert!(interceptor.repanics());

        let request = Request::builder().uri("/a").body(()).unwrap();
        let metadata = RequestMetadata::from_request(&request);
        let first = interceptor.derive_scope(&metadata);
        let second = interceptor.derive_scope(&metadata);

        assert!(!first.same_scope(&second));
        assert_eq!(collector.isolate_count(), 2);
    }
}
