//! Shared application state

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::metrics::ServiceMetrics;
use crate::services::{HealthService, StatusService};
use crate::telemetry::TelemetrySink;

/// Process-wide state handed to every handler
#[derive(Clone, Debug)]
pub struct AppState {
    pub health: Arc<HealthService>,
    pub status: Arc<StatusService>,
    pub metrics: Arc<ServiceMetrics>,
    pub telemetry: Arc<TelemetrySink>,
}

impl AppState {
    pub fn new(
        service: ServiceConfig,
        metrics: Arc<ServiceMetrics>,
        telemetry: Arc<TelemetrySink>,
    ) -> Self {
        Self {
            health: Arc::new(HealthService::new(metrics.clone(), telemetry.clone())),
            status: Arc::new(StatusService::new(service)),
            metrics,
            telemetry,
        }
    }
}
