//! OTLP/HTTP JSON payloads
//!
//! Only the subset of `ExportMetricsServiceRequest` and
//! `ExportTraceServiceRequest` this service emits. 64-bit integers are encoded
//! as decimal strings as the OTLP JSON mapping requires.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// `AGGREGATION_TEMPORALITY_CUMULATIVE`
pub const TEMPORALITY_CUMULATIVE: i32 = 2;

/// `SPAN_KIND_SERVER`
pub const SPAN_KIND_SERVER: i32 = 2;

/// `STATUS_CODE_UNSET`
pub const STATUS_UNSET: i32 = 0;

/// `STATUS_CODE_ERROR`
pub const STATUS_ERROR: i32 = 2;

/// Unix nanoseconds as a decimal string
pub fn unix_nanos(at: DateTime<Utc>) -> String {
    at.timestamp_nanos_opt()
        .map(|n| n.max(0).to_string())
        .unwrap_or_else(|| "0".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnyValue {
    StringValue(String),
    IntValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn string(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: AnyValue::StringValue(value.into()),
        }
    }

    pub fn int(key: &str, value: i64) -> Self {
        Self {
            key: key.to_string(),
            value: AnyValue::IntValue(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
}

// =============================================================================
// Metrics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsServiceRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl ExportMetricsServiceRequest {
    /// All metrics across resources and scopes
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|r| r.scope_metrics.iter())
            .flat_map(|s| s.metrics.iter())
    }

    /// Look up a metric by name
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeMetrics {
    pub scope: InstrumentationScope,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Sum(Sum),
    Histogram(Histogram),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: i32,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    pub attributes: Vec<KeyValue>,
    pub start_time_unix_nano: String,
    pub time_unix_nano: String,
    pub as_int: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub data_points: Vec<HistogramDataPoint>,
    pub aggregation_temporality: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramDataPoint {
    pub attributes: Vec<KeyValue>,
    pub start_time_unix_nano: String,
    pub time_unix_nano: String,
    pub count: String,
    pub sum: f64,
    pub bucket_counts: Vec<String>,
    pub explicit_bounds: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

// =============================================================================
// Traces
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceServiceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

impl ExportTraceServiceRequest {
    /// All spans across resources and scopes
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.resource_spans
            .iter()
            .flat_map(|r| r.scope_spans.iter())
            .flat_map(|s| s.spans.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub kind: i32,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<KeyValue>,
    pub status: SpanStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanStatus {
    pub code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}
