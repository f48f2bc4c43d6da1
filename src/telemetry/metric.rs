//! Per-request measurement handed to the telemetry sink

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Endpoint label for requests that matched no route.
///
/// Raw paths of unknown requests are never used as labels.
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// One served request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetric {
    /// Route template (`/health`) or [`UNMATCHED_ENDPOINT`]
    pub endpoint: String,

    /// HTTP method
    pub method: String,

    /// Wall-clock processing time in milliseconds
    pub duration_ms: f64,

    /// Response status code
    pub status_code: u16,

    /// When processing started
    pub started_at: DateTime<Utc>,
}

impl RequestMetric {
    /// Build a metric for a request that just finished after `elapsed`
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
        elapsed: Duration,
    ) -> Self {
        let now = Utc::now();
        let started_at = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);

        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            status_code,
            started_at,
        }
    }

    /// Check the shape of the metric.
    ///
    /// Both sink variants call this so call sites behave the same whether or
    /// not export is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::InvalidMetric("endpoint is empty".to_string()));
        }
        if !self.endpoint.starts_with('/') && self.endpoint != UNMATCHED_ENDPOINT {
            return Err(Error::InvalidMetric(format!(
                "endpoint '{}' is not a route",
                self.endpoint
            )));
        }
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return Err(Error::InvalidMetric(format!(
                "duration {} is not a valid elapsed time",
                self.duration_ms
            )));
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(Error::InvalidMetric(format!(
                "status code {} out of range",
                self.status_code
            )));
        }
        Ok(())
    }

    /// Server-side failure
    pub fn is_error(&self) -> bool {
        self.status_code >= 500
    }

    /// Span end time
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::microseconds((self.duration_ms * 1000.0) as i64)
    }
}
