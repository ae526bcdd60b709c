//! Application state management
//!
//! Author: hephaex@gmail.com

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use docqa_core::{AppConfig, MetadataRepository, SqliteMetadataStore};
use docqa_rag::DocumentQaService;
use serde::Serialize;
use tokio::sync::RwLock;

/// Request counters for one normalized endpoint
#[derive(Debug, Default, Clone, Serialize)]
pub struct EndpointMetrics {
    /// Requests seen
    pub count: u64,
    /// Responses by status code
    pub status_counts: BTreeMap<u16, u64>,
    /// Sum of request latencies in microseconds
    pub total_latency_us: u64,
    pub max_latency_us: u64,
}

impl EndpointMetrics {
    fn record(&mut self, status: u16, latency_us: u64) {
        self.count += 1;
        *self.status_counts.entry(status).or_default() += 1;
        self.total_latency_us += latency_us;
        self.max_latency_us = self.max_latency_us.max(latency_us);
    }

    /// Mean latency in milliseconds
    pub fn avg_latency_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_latency_us as f64 / self.count as f64 / 1000.0
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Document QA service
    pub service: Arc<DocumentQaService>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Per-endpoint request metrics
    pub metrics: RwLock<BTreeMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Create application state around an assembled service
    pub fn new(config: AppConfig, service: Arc<DocumentQaService>) -> Self {
        Self {
            config,
            service,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open storage and build providers from configuration
    pub async fn initialize(config: AppConfig) -> anyhow::Result<Self> {
        let metadata: Arc<dyn MetadataRepository> =
            Arc::new(SqliteMetadataStore::connect(&config.storage).await?);
        let service = DocumentQaService::from_config(&config, metadata)?;
        Ok(Self::new(config, Arc::new(service)))
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Record one finished request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_record() {
        let mut metrics = EndpointMetrics::default();
        metrics.record(200, 1_000);
        metrics.record(404, 3_000);
        metrics.record(200, 2_000);

        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.status_counts[&200], 2);
        assert_eq!(metrics.status_counts[&404], 1);
        assert_eq!(metrics.max_latency_us, 3_000);
        assert!((metrics.avg_latency_ms() - 2.0).abs() < 1e-9);
    }
}
