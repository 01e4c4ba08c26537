//! Routes of the demo application

use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::io;
use std::panic;
use tripwire_config::ReportingConfig;
use tripwire_middleware::{
    ConfigurationError, ErrorCollector, PanicError, PanicInterceptor, RequestContext, RequestScope,
};

/// Build the interceptor used by the demo routes, answering panics with
/// [`json_fallback`]
pub fn build_interceptor<C: ErrorCollector>(
    config: &ReportingConfig,
    collector: C,
) -> Result<PanicInterceptor, ConfigurationError> {
    PanicInterceptor::builder(config.clone())
        .panic_handler(json_fallback)
        .build(collector)
}

/// Create the application router wrapped in the interceptor
pub fn router(interceptor: PanicInterceptor) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/panic", get(panic_now))
        .route("/disconnect", get(disconnect))
        .route("/tagged", get(tagged))
        .layer(interceptor)
}

/// Sanitized 500 response; the panic message never reaches the client
pub fn json_fallback(context: &RequestContext, _error: PanicError) -> Response {
    let body = json!({
        "error": {
            "code": "INTERNAL_ERROR",
            "message": "Internal server error",
            "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            "path": context.path(),
        }
    });

    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn panic_now(scope: RequestScope) -> &'static str {
    scope.add_breadcrumb("demo", "panic requested");
    panic!("demo panic requested")
}

async fn disconnect() -> &'static str {
    panic::panic_any(io::Error::new(io::ErrorKind::BrokenPipe, "write: broken pipe"))
}

#[derive(Debug, Deserialize)]
struct TagParams {
    feature: Option<String>,
}

async fn tagged(scope: RequestScope, Query(params): Query<TagParams>) -> &'static str {
    let feature = params.feature.unwrap_or_else(|| "unknown".to_string());
    scope.set_tag("feature", &feature);
    scope.add_breadcrumb("demo", "tagged scope before failing");

    panic::panic_any(anyhow::anyhow!("feature '{}' failed", feature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt;
    use tripwire_middleware::testing::MemoryCollector;

    fn app(collector: &MemoryCollector) -> Router {
        let interceptor = build_interceptor(
            &ReportingConfig::new("https://key@errors.example.com/7"),
            collector.clone(),
        )
        .unwrap();
        router(interceptor)
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let collector = MemoryCollector::new();
        let (status, body) = call(app(&collector), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(collector.captured().is_empty());
    }

    #[tokio::test]
    async fn test_panic_route_is_reported_and_sanitized() {
        let collector = MemoryCollector::new();
        let (status, body) = call(app(&collector), "/panic").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["path"], "/panic");
        assert!(!body.to_string().contains("demo panic requested"));

        let captured = collector.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].message, "demo panic requested");
        assert_eq!(collector.scopes()[0].breadcrumbs().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_answered_but_not_reported() {
        let collector = MemoryCollector::new();
        let (status, _body) = call(app(&collector), "/disconnect").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(collector.captured().is_empty());
    }

    #[tokio::test]
    async fn test_tagged_route_reports_error_payload() {
        let collector = MemoryCollector::new();
        let (status, _body) = call(app(&collector), "/tagged?feature=checkout").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let captured = collector.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].kind, "error");
        assert_eq!(captured[0].message, "feature 'checkout' failed");
        assert_eq!(collector.scopes()[0].tag("feature").as_deref(), Some("checkout"));
    }
}
