//! Metrics and telemetry for the CloudWatch datasource
//!
//! Prometheus metrics for upstream API usage, discovery cache behavior and
//! query latency.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // === Upstream Counters ===

    /// Total CloudWatch API calls
    pub static ref API_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "cloudwatch_api_calls_total",
        "Total CloudWatch API calls by operation and status",
        &["operation", "status"]
    ).unwrap();

    /// ListMetrics pages fetched
    pub static ref LIST_METRICS_PAGES: CounterVec = register_counter_vec!(
        "cloudwatch_list_metrics_pages_total",
        "Total ListMetrics pages fetched",
        &["namespace"]
    ).unwrap();

    // === Discovery Cache ===

    /// Discovery cache lookups
    pub static ref DISCOVERY_LOOKUPS: CounterVec = register_counter_vec!(
        "cloudwatch_discovery_lookups_total",
        "Discovery cache lookups by cache and outcome",
        &["cache", "result"]
    ).unwrap();

    // === Latency Histograms ===

    /// Query duration
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "cloudwatch_query_duration_seconds",
        "Query latency in seconds by query kind",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // === System Health ===

    /// Health status (0=unhealthy, 1=healthy)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "cloudwatch_health_status",
        "Datasource health status (0=unhealthy, 1=healthy)"
    ).unwrap();
}

/// Initialize metrics system
pub fn init() {
    HEALTH_STATUS.set(1.0);
    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record one CloudWatch API call
#[inline]
pub fn record_api_call(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    API_CALLS_TOTAL.with_label_values(&[operation, status]).inc();
}

/// Record one ListMetrics page
#[inline]
pub fn record_list_metrics_page(namespace: &str) {
    LIST_METRICS_PAGES.with_label_values(&[namespace]).inc();
}

/// Record a discovery cache lookup (`hit`, `miss` or `refresh_error`)
#[inline]
pub fn record_discovery_lookup(cache: &str, result: &str) {
    DISCOVERY_LOOKUPS.with_label_values(&[cache, result]).inc();
}

/// Record query duration
#[inline]
pub fn record_query(kind: &str, duration_secs: f64) {
    QUERY_DURATION
        .with_label_values(&[kind])
        .observe(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init();
        assert_eq!(HEALTH_STATUS.get(), 1.0);
    }

    #[test]
    fn test_record_api_call() {
        record_api_call("ListMetrics", true);
        record_api_call("ListMetrics", false);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("cloudwatch_api_calls_total"));
    }

    #[test]
    fn test_gather_metrics() {
        init();
        record_discovery_lookup("metric_names", "hit");
        record_query("timeseries", 0.02);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("cloudwatch_health_status"));
        assert!(metrics.contains("cloudwatch_discovery_lookups_total"));
        assert!(metrics.contains("cloudwatch_query_duration_seconds"));
    }
}
