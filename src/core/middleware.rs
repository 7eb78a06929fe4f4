//! HTTP middleware for request ids and request metrics.

use crate::core::logging::{generate_request_id, REQUEST_ID};
use crate::core::metrics::get_metrics;
use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Assign a request id, honouring one supplied by the client.
///
/// The id is scoped into [`REQUEST_ID`] for the handler and echoed in the
/// `x-request-id` response header.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(|v| v.to_string())
        .unwrap_or_else(generate_request_id);

    let mut response = REQUEST_ID.scope(request_id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track request count, duration and in-flight requests per endpoint.
    ///
    /// The endpoint label is the matched route template. Requests that match
    /// no route (static assets and unknown paths) share the `static` label.
    /// For streaming endpoints the duration is time to first byte, since
    /// `next.run()` returns as soon as headers are ready.
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let endpoint_label = request
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| "static".to_string(), |p| p.as_str().to_string());

        let metrics = get_metrics();
        metrics
            .active_requests
            .with_label_values(&[&endpoint_label])
            .inc();

        let start = Instant::now();
        let response = next.run(request).await;
        let duration = start.elapsed().as_secs_f64();
        let status_code = response.status().as_u16().to_string();

        metrics
            .request_count
            .with_label_values(&[&method, &endpoint_label, &status_code])
            .inc();
        metrics
            .request_duration
            .with_label_values(&[&method, &endpoint_label])
            .observe(duration);

        tracing::info!(
            "{} {} - status={} duration={:.3}s",
            method,
            endpoint,
            status_code,
            duration
        );

        metrics
            .active_requests
            .with_label_values(&[&endpoint_label])
            .dec();

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logging::get_request_id;
    use crate::core::metrics::init_metrics;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_request_id_generated() {
        async fn handler() -> String {
            get_request_id()
        }

        let app = Router::new()
            .route("/api/echo", get(handler))
            .layer(middleware::from_fn(request_id_middleware));

        let request = Request::builder()
            .uri("/api/echo")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let header = response
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(header.len(), 36);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, header.as_bytes());
    }

    #[tokio::test]
    async fn test_request_id_honoured_from_client() {
        async fn handler() -> String {
            get_request_id()
        }

        let app = Router::new()
            .route("/api/echo", get(handler))
            .layer(middleware::from_fn(request_id_middleware));

        let request = Request::builder()
            .uri("/api/echo")
            .header("x-request-id", "client-supplied-id")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.headers()["x-request-id"], "client-supplied-id");
    }

    #[tokio::test]
    async fn test_middleware_tracks_request() {
        init_metrics();

        async fn handler() -> &'static str {
            "ok"
        }

        let app = Router::new()
            .route("/api/tracked", get(handler))
            .layer(middleware::from_fn(MetricsMiddleware::track_metrics));

        let labels = ["GET", "/api/tracked", "200"];
        let before = get_metrics().request_count.with_label_values(&labels).get();

        let request = Request::builder()
            .uri("/api/tracked")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let after = get_metrics().request_count.with_label_values(&labels).get();
        assert_eq!(after, before + 1);
    }

    #[tokio::test]
    async fn test_unknown_paths_share_one_label() {
        init_metrics();

        async fn handler() -> &'static str {
            "ok"
        }

        let app = Router::new()
            .route("/api/known", get(handler))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(middleware::from_fn(MetricsMiddleware::track_metrics));

        let labels = ["GET", "static", "404"];
        let before = get_metrics().request_count.with_label_values(&labels).get();

        for i in 0..10 {
            let request = Request::builder()
                .uri(format!("/api/no-such-route-{}", i))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let after = get_metrics().request_count.with_label_values(&labels).get();
        assert_eq!(after, before + 10);

        let leaked = prometheus::gather()
            .into_iter()
            .filter(|family| family.get_name() == "prompt_gateway_requests_total")
            .flat_map(|family| family.get_metric().to_vec())
            .flat_map(|metric| metric.get_label().to_vec())
            .any(|label| label.get_value().starts_with("/api/no-such-route-"));
        assert!(!leaked);
    }

    #[tokio::test]
    async fn test_parameterised_route_labelled_by_template() {
        init_metrics();

        async fn handler() -> &'static str {
            "ok"
        }

        let app = Router::new()
            .route("/api/items/:id", get(handler))
            .layer(middleware::from_fn(MetricsMiddleware::track_metrics));

        let labels = ["GET", "/api/items/:id", "200"];
        let before = get_metrics().request_count.with_label_values(&labels).get();

        for id in ["a", "b", "c"] {
            let request = Request::builder()
                .uri(format!("/api/items/{}", id))
                .body(Body::empty())
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }

        let after = get_metrics().request_count.with_label_values(&labels).get();
        assert_eq!(after, before + 3);
    }

    #[tokio::test]
    async fn test_middleware_increments_active_requests() {
        let metrics = init_metrics();

        let endpoint = "/api/test-active-requests";
        let initial = metrics.active_requests.with_label_values(&[endpoint]).get();

        let in_handler = Arc::new(tokio::sync::Mutex::new(false));
        let in_handler_clone = in_handler.clone();

        async fn slow_handler(flag: Arc<tokio::sync::Mutex<bool>>) -> &'static str {
            *flag.lock().await = true;
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            "ok"
        }

        let app = Router::new()
            .route(endpoint, get(move || slow_handler(in_handler_clone)))
            .layer(middleware::from_fn(MetricsMiddleware::track_metrics));

        let request = Request::builder()
            .uri(endpoint)
            .body(Body::empty())
            .unwrap();

        let handle = tokio::spawn(async move { app.oneshot(request).await.unwrap() });

        while !*in_handler.lock().await {
            tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        }

        let during = metrics.active_requests.with_label_values(&[endpoint]).get();
        assert_eq!(during, initial + 1.0);

        handle.await.unwrap();
        let after = metrics.active_requests.with_label_values(&[endpoint]).get();
        assert_eq!(after, initial);
    }
}
