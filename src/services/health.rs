//! Health Checks
//!
//! Liveness only. No downstream dependency is consulted, so a slow or failing
//! collaborator can never make the probe itself fail.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::ServiceMetrics;
use crate::telemetry::TelemetrySink;

/// Route of the liveness probe
pub const HEALTH_PATH: &str = "/health";

/// Health state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Service is healthy
    Healthy,
    /// Service is unhealthy
    Unhealthy,
}

impl HealthState {
    /// Label value used by metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current state
    pub status: HealthState,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
    /// Health checks served by this process, including this one
    pub call_count: u64,
}

/// Liveness probe with a process-wide call counter
pub struct HealthService {
    call_count: AtomicU64,
    metrics: Arc<ServiceMetrics>,
    telemetry: Arc<TelemetrySink>,
}

impl HealthService {
    pub fn new(metrics: Arc<ServiceMetrics>, telemetry: Arc<TelemetrySink>) -> Self {
        Self {
            call_count: AtomicU64::new(0),
            metrics,
            telemetry,
        }
    }

    /// Report liveness and count the call
    pub fn check_health(&self) -> HealthStatus {
        let call_count = self.call_count.fetch_add(1, Ordering::Relaxed) + 1;
        let status = HealthState::Healthy;

        self.metrics
            .record_health_call(HEALTH_PATH, status.as_str());
        self.telemetry
            .record_health_call(HEALTH_PATH, status.as_str());

        HealthStatus {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            call_count,
        }
    }

    /// Calls served so far
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService")
            .field("call_count", &self.call_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
