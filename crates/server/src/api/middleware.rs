//! Metrics middleware for API routes.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};

/// Label for requests that matched no route.
const UNMATCHED_PATH: &str = "unmatched";

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// The path label is the route template (`/api/v1/tickets/{id}`), never the
/// raw URI, so ticket IDs do not blow up label cardinality.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
        .inc();

    response
}
