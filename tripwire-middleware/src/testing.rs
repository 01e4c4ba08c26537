//! In-memory error collector for tests
//!
//! [`MemoryCollector`] records everything the interceptor asks of it: init
//! calls, isolated scopes, captured events and flushes. Clones share the same
//! record, so a test can hand one clone to the interceptor and inspect another.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::classify::PanicValue;
use crate::collector::{CollectorError, CollectorOptions, ErrorCollector, EventId, ReportingScope};
use crate::scope::RequestMetadata;

/// An event captured by a [`MemoryScope`]
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    /// `None` when the collector was told to drop events
    pub event_id: Option<EventId>,
    pub scope_id: u64,
    pub method: String,
    pub path: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Default)]
struct Record {
    init_calls: Vec<CollectorOptions>,
    scopes: Vec<Arc<MemoryScope>>,
    captured: Vec<CapturedEvent>,
    flushes: Vec<Duration>,
}

#[derive(Default)]
struct Inner {
    record: Mutex<Record>,
    next_scope: AtomicU64,
    init_failure: Option<String>,
    drop_events: bool,
    flush_delay: Option<Duration>,
}

/// Collector that keeps everything in memory
#[derive(Clone, Default)]
pub struct MemoryCollector {
    inner: Arc<Inner>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `init` call with the given reason
    pub fn failing_init(self, reason: impl Into<String>) -> Self {
        self.reconfigure(|inner| inner.init_failure = Some(reason.into()))
    }

    /// Accept captures without assigning event ids, as a sampled-out client would
    pub fn dropping_events(self) -> Self {
        self.reconfigure(|inner| inner.drop_events = true)
    }

    /// Make every flush block for `delay` before reporting success
    pub fn with_flush_delay(self, delay: Duration) -> Self {
        self.reconfigure(|inner| inner.flush_delay = Some(delay))
    }

    fn reconfigure(self, apply: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Inner {
            record: Mutex::new(Record::default()),
            next_scope: AtomicU64::new(0),
            init_failure: self.inner.init_failure.clone(),
            drop_events: self.inner.drop_events,
            flush_delay: self.inner.flush_delay,
        };
        apply(&mut inner);
        Self { inner: Arc::new(inner) }
    }

    pub fn init_calls(&self) -> Vec<CollectorOptions> {
        self.inner.record.lock().init_calls.clone()
    }

    pub fn isolate_count(&self) -> usize {
        self.inner.record.lock().scopes.len()
    }

    /// Scopes in the order they were isolated
    pub fn scopes(&self) -> Vec<Arc<MemoryScope>> {
        self.inner.record.lock().scopes.clone()
    }

    pub fn captured(&self) -> Vec<CapturedEvent> {
        self.inner.record.lock().captured.clone()
    }

    /// Timeouts passed to `flush`, one per call
    pub fn flushes(&self) -> Vec<Duration> {
        self.inner.record.lock().flushes.clone()
    }
}

impl ErrorCollector for MemoryCollector {
    fn init(&self, options: &CollectorOptions) -> Result<(), CollectorError> {
        self.inner.record.lock().init_calls.push(options.clone());

        match &self.inner.init_failure {
            Some(reason) => Err(CollectorError::Backend(reason.clone())),
            None => Ok(()),
        }
    }

    fn isolate(&self) -> Arc<dyn ReportingScope> {
        let scope = Arc::new(MemoryScope {
            id: self.inner.next_scope.fetch_add(1, Ordering::SeqCst),
            collector: Arc::clone(&self.inner),
            request: Mutex::new(None),
            tags: Mutex::new(BTreeMap::new()),
            breadcrumbs: Mutex::new(Vec::new()),
        });
        self.inner.record.lock().scopes.push(Arc::clone(&scope));
        scope
    }
}

/// Scope isolated by a [`MemoryCollector`]
pub struct MemoryScope {
    id: u64,
    collector: Arc<Inner>,
    request: Mutex<Option<RequestMetadata>>,
    tags: Mutex<BTreeMap<String, String>>,
    breadcrumbs: Mutex<Vec<(String, String)>>,
}

impl MemoryScope {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request this scope was tagged with
    pub fn request(&self) -> Option<RequestMetadata> {
        self.request.lock().clone()
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        self.tags.lock().clone()
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.lock().get(key).cloned()
    }

    /// `(category, message)` pairs in insertion order
    pub fn breadcrumbs(&self) -> Vec<(String, String)> {
        self.breadcrumbs.lock().clone()
    }
}

impl ReportingScope for MemoryScope {
    fn tag_request(&self, request: &RequestMetadata) {
        *self.request.lock() = Some(request.clone());
    }

    fn set_tag(&self, key: &str, value: &str) {
        self.tags.lock().insert(key.to_string(), value.to_string());
    }

    fn add_breadcrumb(&self, category: &str, message: &str) {
        self.breadcrumbs
            .lock()
            .push((category.to_string(), message.to_string()));
    }

    fn capture(&self, request: &RequestMetadata, panic: &PanicValue<'_>) -> Option<EventId> {
        let event_id = (!self.collector.drop_events).then(Uuid::new_v4);

        self.collector.record.lock().captured.push(CapturedEvent {
            event_id,
            scope_id: self.id,
            method: request.method().to_string(),
            path: request.path().to_string(),
            kind: panic.kind(),
            message: panic.message(),
        });

        event_id
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.collector.record.lock().flushes.push(timeout);

        if let Some(delay) = self.collector.flush_delay {
            std::thread::sleep(delay);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_clones_share_the_record() {
        let collector = MemoryCollector::new();
        let clone = collector.clone();

        clone.isolate().set_tag("tenant", "acme");

        assert_eq!(collector.isolate_count(), 1);
        assert_eq!(collector.scopes()[0].tag("tenant").as_deref(), Some("acme"));
    }

    #[test]
    fn test_dropping_events_assigns_no_id() {
        let collector = MemoryCollector::new().dropping_events();
        let scope = collector.isolate();
        let request = Request::builder().uri("/jobs").body(()).unwrap();
        let metadata = RequestMetadata::from_request(&request);

        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let id = scope.capture(&metadata, &PanicValue::classify(payload.as_ref()));

        assert!(id.is_none());
        assert_eq!(collector.captured()[0].path, "/jobs");
    }

    #[test]
    fn test_failing_init_records_the_call() {
        let collector = MemoryCollector::new().failing_init("unreachable");
        let options = CollectorOptions {
            service_address: "https://key@errors.example.com/1".to_string(),
            sample_rate: 1.0,
        };

        assert!(matches!(collector.init(&options), Err(CollectorError::Backend(_))));
        assert_eq!(collector.init_calls().len(), 1);
    }
}
