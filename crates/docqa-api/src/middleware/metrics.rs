//! Request metrics middleware
//!
//! Counts requests and records latency and status per endpoint for the
//! `/metrics` report.
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Record request count, latency and status code for every request
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = format!(
        "{} {}",
        request.method(),
        normalize_endpoint(request.uri().path())
    );

    state.increment_requests();
    let response = next.run(request).await;

    let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    state
        .record_request(endpoint, response.status().as_u16(), latency_us)
        .await;

    response
}

/// Replace id segments so requests for different documents share a key
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_uuid(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("/api/v1/documents/550e8400-e29b-41d4-a716-446655440000/index"),
            "/api/v1/documents/:id/index"
        );
        assert_eq!(normalize_endpoint("/api/v1/questions/ask"), "/api/v1/questions/ask");
        assert_eq!(normalize_endpoint("/health"), "/health");
    }

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid("not-a-uuid"));
        assert!(!is_uuid("123"));
    }
}
