//! Recovery from panics raised while handling a request
//!
//! Order of operations for a recovered panic:
//! 1. classify the payload; client disconnects are not reported
//! 2. capture everything else through the request's scope
//! 3. when delivery is awaited and an event was captured, flush, bounded by
//!    the delivery timeout
//! 4. hand the panic to the fallback handler, or resume the unwind with the
//!    original payload

use axum::response::Response;
use std::any::Any;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::classify::PanicValue;
use crate::collector::{EventId, ReportingScope};
use crate::error::PanicError;
use crate::scope::RequestContext;

/// Fallback invoked with the request and the recovered panic; its response is
/// sent in place of the one the panicking handler never produced
pub type PanicHandler = Arc<dyn Fn(&RequestContext, PanicError) -> Response + Send + Sync>;

/// Coordinates reporting and control flow after a panic
#[derive(Clone)]
pub struct Recovery {
    wait_for_delivery: bool,
    delivery_timeout: Duration,
    panic_handler: Option<PanicHandler>,
}

impl Recovery {
    pub fn new(wait_for_delivery: bool, delivery_timeout: Duration) -> Self {
        Self {
            wait_for_delivery,
            delivery_timeout,
            panic_handler: None,
        }
    }

    pub fn with_panic_handler(mut self, handler: PanicHandler) -> Self {
        self.panic_handler = Some(handler);
        self
    }

    /// True when recovered panics are resumed rather than handled
    pub fn repanics(&self) -> bool {
        self.panic_handler.is_none()
    }

    pub fn wait_for_delivery(&self) -> bool {
        self.wait_for_delivery
    }

    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Pass a completed call through untouched, or recover from its panic
    pub async fn settle<E>(
        &self,
        context: &RequestContext,
        outcome: std::thread::Result<Result<Response, E>>,
    ) -> Result<Response, E> {
        match outcome {
            Ok(result) => result,
            Err(payload) => Ok(self.recover(context, payload).await),
        }
    }

    /// Report a panic and either handle it or resume unwinding.
    ///
    /// Returns only when a fallback handler is configured.
    pub async fn recover(&self, context: &RequestContext, payload: Box<dyn Any + Send>) -> Response {
        // Borrows of the payload must end before the first await
        let captured = self.capture(context, payload.as_ref());

        if let Some(event_id) = captured.filter(|_| self.wait_for_delivery) {
            self.await_delivery(context.scope().reporting_scope(), event_id)
                .await;
        }

        match &self.panic_handler {
            Some(handler) => {
                let error = PanicError::from_payload(payload);
                debug!(
                    method = %context.method(),
                    path = %context.path(),
                    error = %error,
                    "Dispatching recovered panic to fallback handler"
                );
                handler(context, error)
            }
            None => panic::resume_unwind(payload),
        }
    }

    /// Classify the payload and report it unless the client disconnected
    pub fn capture(&self, context: &RequestContext, payload: &(dyn Any + Send)) -> Option<EventId> {
        let panic = PanicValue::classify(payload);

        if panic.is_suppressed() {
            debug!(
                method = %context.method(),
                path = %context.path(),
                kind = panic.kind(),
                message = %panic.message(),
                "Client disconnected mid-response, panic not reported"
            );
            return None;
        }

        let event_id = context
            .scope()
            .reporting_scope()
            .capture(context.metadata(), &panic);

        match event_id {
            Some(event_id) => error!(
                method = %context.method(),
                path = %context.path(),
                kind = panic.kind(),
                message = %panic.message(),
                event_id = %event_id,
                "Recovered panic reported"
            ),
            None => warn!(
                method = %context.method(),
                path = %context.path(),
                kind = panic.kind(),
                message = %panic.message(),
                "Recovered panic was not captured by the collector"
            ),
        }

        event_id
    }

    /// Wait for the collector to drain, never longer than the delivery timeout.
    ///
    /// A flush still running at the timeout is left on the blocking pool;
    /// runtime shutdown waits for it, up to the collector's own flush time.
    async fn await_delivery(&self, scope: &Arc<dyn ReportingScope>, event_id: EventId) {
        let timeout = self.delivery_timeout;
        let scope = Arc::clone(scope);

        // The flush blocks; keep it off the async workers
        let flush = tokio::task::spawn_blocking(move || scope.flush(timeout));

        match tokio::time::timeout(timeout, flush).await {
            Ok(Ok(true)) => debug!(event_id = %event_id, "Event delivered"),
            Ok(Ok(false)) => warn!(
                event_id = %event_id,
                timeout = ?timeout,
                "Collector did not confirm delivery before the timeout"
            ),
            Ok(Err(join_error)) => warn!(
                event_id = %event_id,
                error = %join_error,
                "Event flush task failed"
            ),
            Err(_) => warn!(
                event_id = %event_id,
                timeout = ?timeout,
                "Gave up waiting for event delivery"
            ),
        }
    }
}

impl std::fmt::Debug for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovery")
            .field("wait_for_delivery", &self.wait_for_delivery)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("repanic", &self.repanics())
            .finish()
    }
}
