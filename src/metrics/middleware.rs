use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::debug;

/// Measures request processing duration and records the HTTP request metrics.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    // Route templates keep the label set bounded.
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let elapsed = start.elapsed();

    debug!(
        http.method = %method,
        url.path = %path,
        http.status_code = status,
        http.response.duration = ?elapsed,
        "metrics_middleware: request handled"
    );
    super::record_http_request(method, path, status, elapsed);

    response
}
