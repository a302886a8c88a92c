//! Request middleware for tracing and metrics

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use fastpath_common::Timestamp;
use metrics::{counter, histogram};

/// Whether a response status should be logged as a failure.
///
/// 503 is excluded; the pool rate-limits its own exhaustion warning.
pub(crate) fn is_request_failure(status: StatusCode) -> bool {
    status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE
}

/// Logging middleware
pub async fn logging(request: Request<Body>, next: Next) -> Response {
    let start = Timestamp::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    // Route template keeps label cardinality bounded
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    let elapsed = start.elapsed_micros();
    let status = response.status();

    counter!(
        "fastpath_http_requests_total",
        "route" => route.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    histogram!("fastpath_http_request_duration_us", "route" => route).record(elapsed as f64);

    if is_request_failure(status) {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status,
            latency_us = elapsed,
            "request failed"
        );
    } else {
        tracing::debug!(
            method = %method,
            uri = %uri,
            status = %status,
            latency_us = elapsed,
            "request complete"
        );
    }

    response
}
