//! Service metrics registry

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::Result;
use crate::telemetry::RequestMetric;

/// Counter incremented by every health check
pub const HEALTH_CALLS_METRIC: &str = "health_endpoint_calls_total";

/// Request latency buckets in seconds
const LATENCY_BUCKETS: [f64; 11] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Owned Prometheus registry with the service's metric families
pub struct ServiceMetrics {
    registry: Registry,
    health_calls: IntCounterVec,
    requests: IntCounterVec,
    request_duration: HistogramVec,
}

impl ServiceMetrics {
    /// Create and register all metric families
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let health_calls = IntCounterVec::new(
            Opts::new(
                HEALTH_CALLS_METRIC,
                "Number of times the health endpoint has been called",
            ),
            &["endpoint", "status"],
        )?;
        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests served"),
            &["endpoint", "method", "status_code"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request processing time",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["endpoint"],
        )?;

        registry.register(Box::new(health_calls.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            health_calls,
            requests,
            request_duration,
        })
    }

    /// Count one health check
    pub fn record_health_call(&self, endpoint: &str, status: &str) {
        self.health_calls
            .with_label_values(&[endpoint, status])
            .inc();
    }

    /// Current health call count for a label pair
    pub fn health_calls(&self, endpoint: &str, status: &str) -> u64 {
        self.health_calls
            .with_label_values(&[endpoint, status])
            .get()
    }

    /// Count and time one served request
    pub fn observe_request(&self, metric: &RequestMetric) {
        let status_code = metric.status_code.to_string();
        self.requests
            .with_label_values(&[metric.endpoint.as_str(), metric.method.as_str(), status_code.as_str()])
            .inc();
        self.request_duration
            .with_label_values(&[metric.endpoint.as_str()])
            .observe(metric.duration_ms / 1000.0);
    }

    /// Requests served for a label triple
    pub fn requests(&self, endpoint: &str, method: &str, status_code: u16) -> u64 {
        let status_code = status_code.to_string();
        self.requests
            .with_label_values(&[endpoint, method, status_code.as_str()])
            .get()
    }

    /// Encode every family in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_health_calls_counted_per_label() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_health_call("/health", "healthy");
        metrics.record_health_call("/health", "healthy");

        assert_eq!(metrics.health_calls("/health", "healthy"), 2);
        assert_eq!(metrics.health_calls("/health", "unhealthy"), 0);
    }

    #[test]
    fn test_observe_request() {
        let metrics = ServiceMetrics::new().unwrap();
        let metric = RequestMetric::new("/status", "GET", 200, Duration::from_millis(3));
        metrics.observe_request(&metric);
        metrics.observe_request(&metric);

        assert_eq!(metrics.requests("/status", "GET", 200), 2);
        assert_eq!(metrics.requests("/status", "GET", 500), 0);
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_health_call("/health", "healthy");
        metrics.observe_request(&RequestMetric::new(
            "/health",
            "GET",
            200,
            Duration::from_millis(1),
        ));

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("# TYPE health_endpoint_calls_total counter"));
        assert!(text.contains(
            "health_endpoint_calls_total{endpoint=\"/health\",status=\"healthy\"} 1"
        ));
        assert!(text.contains("http_request_duration_seconds_count{endpoint=\"/health\"} 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = ServiceMetrics::new().unwrap();
        let b = ServiceMetrics::new().unwrap();
        a.record_health_call("/health", "healthy");
        assert_eq!(b.health_calls("/health", "healthy"), 0);
    }
}
