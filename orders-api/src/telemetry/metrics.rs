//! Prometheus Metrics Definitions
//!
//! Metrics for the read API, the cache and ingestion, exposed on `/metrics`
//! for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use orders_storage::CacheStats;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<OrdersMetrics>> = Lazy::new(OrdersMetrics::new);

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

/// Container for all service metrics.
#[derive(Clone)]
pub struct OrdersMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Ingestion outcomes - labels: outcome
    pub ingest_messages_total: CounterVec,

    /// Read path cache lookups - labels: result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Orders currently held in the cache
    pub cache_entries: Gauge,

    /// New keys the cache turned away since boot
    pub cache_rejected: Gauge,
}

impl OrdersMetrics {
    /// Create and register all metrics with the default Prometheus registry.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "orders_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "orders_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            ingest_messages_total: register_counter_vec!(
                "orders_ingest_messages_total",
                "Broker messages handled by ingestion, by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("ingest_messages_total", e))?,

            cache_lookups_total: register_counter_vec!(
                "orders_cache_lookups_total",
                "Order cache lookups on the read path",
                &["result"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,

            cache_entries: register_gauge!(
                "orders_cache_entries",
                "Current number of cached orders"
            )
            .map_err(|e| registration_error("cache_entries", e))?,

            cache_rejected: register_gauge!(
                "orders_cache_rejected",
                "New orders not cached because the cache was full"
            )
            .map_err(|e| registration_error("cache_rejected", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record one ingestion outcome, e.g. `persisted` or `skipped`.
    pub fn record_ingest(&self, outcome: &str) {
        self.ingest_messages_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn set_cache_stats(&self, stats: &CacheStats) {
        self.cache_entries.set(stats.entry_count as f64);
        self.cache_rejected.set(stats.rejected as f64);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Registers the service families on the first scrape.
    if let Err(e) = METRICS.as_ref() {
        tracing::warn!(error = %e, "Service metrics unavailable");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Result<&'static OrdersMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let m = metrics()?;
        let before = m
            .http_requests_total
            .with_label_values(&["GET", "/test/metrics", "200"])
            .get();
        m.record_http_request("GET", "/test/metrics", 200, 0.015);
        let after = m
            .http_requests_total
            .with_label_values(&["GET", "/test/metrics", "200"])
            .get();
        assert_eq!(after - before, 1.0);
        Ok(())
    }

    #[test]
    fn test_record_ingest_outcomes() -> Result<(), String> {
        let m = metrics()?;
        let before = m.ingest_messages_total.with_label_values(&["test_outcome"]).get();
        m.record_ingest("test_outcome");
        m.record_ingest("test_outcome");
        let after = m.ingest_messages_total.with_label_values(&["test_outcome"]).get();
        assert_eq!(after - before, 2.0);
        Ok(())
    }

    #[test]
    fn test_cache_metrics() -> Result<(), String> {
        let m = metrics()?;
        m.record_cache_lookup(true);
        m.record_cache_lookup(false);
        assert!(m.cache_lookups_total.with_label_values(&["hit"]).get() >= 1.0);
        assert!(m.cache_lookups_total.with_label_values(&["miss"]).get() >= 1.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_lists_families() -> Result<(), String> {
        metrics()?.record_ingest("persisted");
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let text = TextEncoder::new()
            .encode_to_string(&prometheus::gather())
            .map_err(|e| e.to_string())?;
        assert!(text.contains("orders_cache_entries"));
        assert!(text.contains("orders_cache_rejected"));
        Ok(())
    }
}
