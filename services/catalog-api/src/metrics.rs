//! Prometheus metrics exposition
//!
//! Registers and exposes the service's metrics:
//!
//! - `catalog_requests_total` (counter): labels `route`, `outcome`
//! - `catalog_cache_results_total` (counter): labels `route`, `result`
//! - `igdb_requests_total` / `igdb_request_duration_seconds`: recorded by
//!   the gateway crate per upstream attempt
//!
//! Plus the plain atomic counters surfaced by `/health`.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Runtime counters reported by the health endpoint.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `igdb_request_duration_seconds` with explicit buckets so it
/// renders as a histogram (with `_bucket` lines for `histogram_quantile()`
/// queries) rather than the default summary. The upper buckets cover the
/// 5s per-attempt timeout.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "igdb_request_duration_seconds".to_string(),
            ),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed catalog request with route and outcome labels.
pub fn record_route(route: &'static str, outcome: &'static str) {
    metrics::counter!("catalog_requests_total", "route" => route, "outcome" => outcome)
        .increment(1);
}

/// Record a cache lookup result for a cacheable route.
pub fn record_cache(route: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("catalog_cache_results_total", "route" => route, "result" => result)
        .increment(1);
}
