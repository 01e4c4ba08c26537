//! Per-request reporting scopes
//!
//! Each request gets its own [`RequestScope`], isolated from the shared
//! collector when the request enters the interceptor and stored in the
//! request extensions. Downstream stages look it up to add tags and
//! breadcrumbs before a panic is reported.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, Method, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::collector::{ErrorCollector, ReportingScope};

/// Name the scope is known by in logs and tags
pub const SCOPE_KEY: &str = "sentry";

/// Headers never forwarded to the collection service
const REDACTED_HEADERS: [&str; 4] = ["authorization", "proxy-authorization", "cookie", "set-cookie"];

/// Owned snapshot of the inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestMetadata {
    pub fn new(method: Method, uri: Uri, version: Version, headers: &HeaderMap) -> Self {
        let mut headers = headers.clone();
        for name in REDACTED_HEADERS {
            headers.remove(name);
        }

        Self {
            method,
            uri,
            version,
            headers,
        }
    }

    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.version(),
            request.headers(),
        )
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.version, &parts.headers)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Request headers, without credentials
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Absolute URL of the request, using the `Host` header for origin-form URIs
    pub fn absolute_url(&self) -> Option<String> {
        if self.uri.scheme().is_some() {
            return Some(self.uri.to_string());
        }

        let host = self.headers.get(header::HOST)?.to_str().ok()?;
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Some(format!("http://{}{}", host, path))
    }
}

/// Handle to the reporting scope of one request
#[derive(Clone)]
pub struct RequestScope {
    inner: Arc<dyn ReportingScope>,
}

impl RequestScope {
    pub fn new(inner: Arc<dyn ReportingScope>) -> Self {
        Self { inner }
    }

    /// Add a tag to every event reported from this request
    pub fn set_tag(&self, key: &str, value: &str) {
        self.inner.set_tag(key, value);
    }

    /// Record a breadcrumb leading up to a potential panic
    pub fn add_breadcrumb(&self, category: &str, message: &str) {
        self.inner.add_breadcrumb(category, message);
    }

    /// Whether both handles point at the same underlying scope
    pub fn same_scope(&self, other: &RequestScope) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    pub fn reporting_scope(&self) -> &Arc<dyn ReportingScope> {
        &self.inner
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("key", &SCOPE_KEY)
            .field("scope", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Isolate a scope for one request and tag it with the request
pub fn derive_scope(collector: &dyn ErrorCollector, request: &RequestMetadata) -> RequestScope {
    let scope = collector.isolate();
    scope.tag_request(request);
    RequestScope::new(scope)
}

/// The scope the interceptor attached to this request, if any
pub fn lookup_scope<B>(request: &Request<B>) -> Option<RequestScope> {
    request.extensions().get::<RequestScope>().cloned()
}

/// What the collector and the fallback handler know about a request
#[derive(Debug, Clone)]
pub struct RequestContext {
    metadata: RequestMetadata,
    scope: RequestScope,
}

impl RequestContext {
    pub fn new(metadata: RequestMetadata, scope: RequestScope) -> Self {
        Self { metadata, scope }
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    pub fn method(&self) -> &Method {
        self.metadata.method()
    }

    pub fn path(&self) -> &str {
        self.metadata.path()
    }
}

/// Extension trait for reading the scope off requests
pub trait RequestScopeExt {
    fn request_scope(&self) -> Option<RequestScope>;
}

impl<B> RequestScopeExt for Request<B> {
    fn request_scope(&self) -> Option<RequestScope> {
        lookup_scope(self)
    }
}

impl RequestScopeExt for Parts {
    fn request_scope(&self) -> Option<RequestScope> {
        self.extensions.get::<RequestScope>().cloned()
    }
}

/// Rejection used when a handler asks for a scope outside the interceptor
#[derive(Debug, Error)]
#[error("Request scope is unavailable, the panic interceptor is not installed for this route")]
pub struct MissingScope;

impl IntoResponse for MissingScope {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Axum extractor for the request scope
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = MissingScope;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.request_scope().ok_or(MissingScope)
    }
}
