//! Health check handlers
//!
//! Author: hephaex@gmail.com

use crate::state::{AppState, EndpointMetrics};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use docqa_rag::CacheStatsReport;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_info: BuildInfo,
}

#[derive(Serialize, ToSchema)]
pub struct BuildInfo {
    pub name: String,
    pub rust_version: String,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_info: BuildInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            rust_version: "1.75+".to_string(),
        },
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    /// Metadata store answered a query
    pub database: bool,
    /// Language model used for answers
    pub llm_model: String,
}

/// Readiness probe - checks dependencies
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.service.list_documents(1, 0).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check: metadata store unavailable");
            false
        }
    };
    let ready = state.is_ready() && database;

    let response = ReadinessResponse {
        ready,
        checks: ReadinessChecks {
            database,
            llm_model: state.config.llm.model.clone(),
        },
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// JSON metrics response
#[derive(Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub endpoints: BTreeMap<String, EndpointSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_cache: Option<CacheStatsReport>,
}

#[derive(Serialize)]
pub struct EndpointSummary {
    pub count: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
}

impl From<&EndpointMetrics> for EndpointSummary {
    fn from(metrics: &EndpointMetrics) -> Self {
        Self {
            count: metrics.count,
            status_counts: metrics.status_counts.clone(),
            avg_latency_ms: metrics.avg_latency_ms(),
            max_latency_ms: metrics.max_latency_us as f64 / 1000.0,
        }
    }
}

/// Request counters and cache statistics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };

    let endpoints = state
        .metrics
        .read()
        .await
        .iter()
        .map(|(endpoint, m)| (endpoint.clone(), EndpointSummary::from(m)))
        .collect();

    Json(MetricsResponse {
        uptime_seconds: uptime,
        total_requests,
        requests_per_second: rps,
        endpoints,
        embedding_cache: state.service.cache_stats(),
    })
}
