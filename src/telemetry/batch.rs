//! In-process aggregation between flushes
//!
//! Health call counts, request counts and duration histograms are cumulative
//! from process start; spans are delta and cleared on every export.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::otlp::{
    self, ExportMetricsServiceRequest, ExportTraceServiceRequest, HistogramDataPoint,
    InstrumentationScope, KeyValue, Metric, MetricData, NumberDataPoint, ResourceMetrics,
    ResourceSpans, ScopeMetrics, ScopeSpans, Span, SpanStatus,
};
use super::{RequestMetric, Resource};

/// OTLP name of the health check counter
pub const CALLS_METRIC: &str = "health_endpoint_calls";

/// OTLP name of the per-request counter
pub const REQUESTS_METRIC: &str = "http_server_requests";

/// OTLP name of the duration histogram
pub const DURATION_METRIC: &str = "http_request_duration_ms";

/// Histogram bounds in milliseconds
pub const DURATION_BOUNDS_MS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// Spans kept per interval; the rest are dropped
pub const MAX_PENDING_SPANS: usize = 2048;

/// Explicit-bounds histogram
#[derive(Debug, Clone, PartialEq)]
pub struct DurationHistogram {
    bounds: Vec<f64>,
    /// One more bucket than bounds; the last one is the overflow bucket
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self::with_bounds(DURATION_BOUNDS_MS.to_vec())
    }

    pub fn with_bounds(mut bounds: Vec<f64>) -> Self {
        bounds.sort_by(|a, b| a.total_cmp(b));
        let buckets = vec![0; bounds.len() + 1];
        Self {
            bounds,
            buckets,
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn observe(&mut self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bounds.len());
        self.buckets[idx] += 1;
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    fn data_point(
        &self,
        attributes: Vec<KeyValue>,
        start: &str,
        now: &str,
    ) -> HistogramDataPoint {
        HistogramDataPoint {
            attributes,
            start_time_unix_nano: start.to_string(),
            time_unix_nano: now.to_string(),
            count: self.count.to_string(),
            sum: self.sum,
            bucket_counts: self.buckets.iter().map(u64::to_string).collect(),
            explicit_bounds: self.bounds.clone(),
            min: if self.count == 0 { 0.0 } else { self.min },
            max: if self.count == 0 { 0.0 } else { self.max },
        }
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything due for export at one flush
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPayload {
    pub metrics: ExportMetricsServiceRequest,
    /// `None` when no request finished since the previous flush
    pub traces: Option<ExportTraceServiceRequest>,
}

/// Aggregated request telemetry
#[derive(Debug, Clone)]
pub struct MetricBatch {
    started_at: DateTime<Utc>,
    health_calls: BTreeMap<(String, &'static str), u64>,
    requests: BTreeMap<(String, u16), u64>,
    durations: BTreeMap<String, DurationHistogram>,
    spans: Vec<Span>,
    dropped_spans: u64,
    dirty: bool,
}

impl MetricBatch {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            health_calls: BTreeMap::new(),
            requests: BTreeMap::new(),
            durations: BTreeMap::new(),
            spans: Vec::new(),
            dropped_spans: 0,
            dirty: false,
        }
    }

    /// Fold one request into the batch
    pub fn record(&mut self, metric: RequestMetric) {
        *self
            .requests
            .entry((metric.endpoint.clone(), metric.status_code))
            .or_insert(0) += 1;

        self.durations
            .entry(metric.endpoint.clone())
            .or_default()
            .observe(metric.duration_ms);

        if self.spans.len() < MAX_PENDING_SPANS {
            self.spans.push(server_span(&metric));
        } else {
            self.dropped_spans += 1;
        }

        self.dirty = true;
    }

    /// Something was recorded since the last export
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Count one health check result
    pub fn record_health_call(&mut self, endpoint: &str, status: &'static str) {
        *self
            .health_calls
            .entry((endpoint.to_string(), status))
            .or_insert(0) += 1;
        self.dirty = true;
    }

    /// Cumulative health checks for an endpoint/status pair
    pub fn health_calls(&self, endpoint: &str, status: &str) -> u64 {
        self.health_calls
            .iter()
            .find(|((e, st), _)| e == endpoint && *st == status)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Cumulative requests for an endpoint/status code pair
    pub fn requests(&self, endpoint: &str, status_code: u16) -> u64 {
        self.requests
            .get(&(endpoint.to_string(), status_code))
            .copied()
            .unwrap_or(0)
    }

    /// Spans waiting for the next export
    pub fn pending_spans(&self) -> usize {
        self.spans.len()
    }

    /// Spans discarded because the interval overflowed
    pub fn dropped_spans(&self) -> u64 {
        self.dropped_spans
    }

    /// Build the export payload and mark the batch clean.
    ///
    /// Returns `None` when nothing was recorded since the previous call.
    pub fn take_export(&mut self, resource: &Resource, now: DateTime<Utc>) -> Option<ExportPayload> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;

        let start = otlp::unix_nanos(self.started_at);
        let now = otlp::unix_nanos(now);

        let call_points: Vec<NumberDataPoint> = self
            .health_calls
            .iter()
            .map(|((endpoint, status), count)| NumberDataPoint {
                attributes: vec![
                    KeyValue::string("endpoint", endpoint.as_str()),
                    KeyValue::string("status", *status),
                ],
                start_time_unix_nano: start.clone(),
                time_unix_nano: now.clone(),
                as_int: count.to_string(),
            })
            .collect();

        let request_points: Vec<NumberDataPoint> = self
            .requests
            .iter()
            .map(|((endpoint, status_code), count)| NumberDataPoint {
                attributes: vec![
                    KeyValue::string("endpoint", endpoint.as_str()),
                    KeyValue::int("status_code", i64::from(*status_code)),
                ],
                start_time_unix_nano: start.clone(),
                time_unix_nano: now.clone(),
                as_int: count.to_string(),
            })
            .collect();

        let duration_points: Vec<HistogramDataPoint> = self
            .durations
            .iter()
            .map(|(endpoint, histogram)| {
                histogram.data_point(
                    vec![KeyValue::string("endpoint", endpoint.as_str())],
                    &start,
                    &now,
                )
            })
            .collect();

        let metrics = ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: resource.to_otlp(),
                scope_metrics: vec![ScopeMetrics {
                    scope: scope(),
                    metrics: [
                        monotonic_sum(
                            CALLS_METRIC,
                            "Number of health checks per endpoint and status",
                            call_points,
                        ),
                        monotonic_sum(
                            REQUESTS_METRIC,
                            "Number of requests per endpoint and status code",
                            request_points,
                        ),
                        (!duration_points.is_empty()).then(|| Metric {
                            name: DURATION_METRIC.to_string(),
                            description: "Request processing time".to_string(),
                            unit: "ms".to_string(),
                            data: MetricData::Histogram(otlp::Histogram {
                                data_points: duration_points,
                                aggregation_temporality: otlp::TEMPORALITY_CUMULATIVE,
                            }),
                        }),
                    ]
                    .into_iter()
                    .flatten()
                    .collect(),
                }],
            }],
        };

        let spans = std::mem::take(&mut self.spans);
        let traces = (!spans.is_empty()).then(|| ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: resource.to_otlp(),
                scope_spans: vec![ScopeSpans {
                    scope: scope(),
                    spans,
                }],
            }],
        });

        Some(ExportPayload { metrics, traces })
    }
}

/// Cumulative counter; `None` when nothing was counted yet
fn monotonic_sum(name: &str, description: &str, points: Vec<NumberDataPoint>) -> Option<Metric> {
    if points.is_empty() {
        return None;
    }
    Some(Metric {
        name: name.to_string(),
        description: description.to_string(),
        unit: "1".to_string(),
        data: MetricData::Sum(otlp::Sum {
            data_points: points,
            aggregation_temporality: otlp::TEMPORALITY_CUMULATIVE,
            is_monotonic: true,
        }),
    })
}

fn scope() -> InstrumentationScope {
    InstrumentationScope {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn server_span(metric: &RequestMetric) -> Span {
    let span_id = Uuid::new_v4().simple().to_string();
    let status = if metric.is_error() {
        SpanStatus {
            code: otlp::STATUS_ERROR,
            message: format!("HTTP {}", metric.status_code),
        }
    } else {
        SpanStatus {
            code: otlp::STATUS_UNSET,
            message: String::new(),
        }
    };

    Span {
        trace_id: Uuid::new_v4().simple().to_string(),
        span_id: span_id[..16].to_string(),
        name: format!("{} {}", metric.method, metric.endpoint),
        kind: otlp::SPAN_KIND_SERVER,
        start_time_unix_nano: otlp::unix_nanos(metric.started_at),
        end_time_unix_nano: otlp::unix_nanos(metric.finished_at()),
        attributes: vec![
            KeyValue::string("http.method", metric.method.as_str()),
            KeyValue::string("http.route", metric.endpoint.as_str()),
            KeyValue::int("http.status_code", i64::from(metric.status_code)),
        ],
        status,
    }
}

// =============================================================================
// Tests
// =============================================================================
