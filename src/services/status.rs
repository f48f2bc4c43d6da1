//! Status reporting

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;

/// Route of the status report
pub const STATUS_PATH: &str = "/status";

/// Operational state reported by `/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Operational,
}

/// Status response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ServiceState,
    pub application: String,
    pub version: String,
    pub environment: String,
    /// Seconds since the service was constructed
    pub uptime_seconds: f64,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
}

/// Uptime and build identity
#[derive(Debug)]
pub struct StatusService {
    started_at: Instant,
    config: ServiceConfig,
}

impl StatusService {
    /// Capture the start time now
    pub fn new(config: ServiceConfig) -> Self {
        Self::started_at(config, Instant::now())
    }

    /// Use an explicit start time
    pub fn started_at(config: ServiceConfig, started_at: Instant) -> Self {
        Self { started_at, config }
    }

    pub fn get_status(&self) -> StatusReport {
        StatusReport {
            status: ServiceState::Operational,
            application: self.config.application.clone(),
            version: self.config.version.clone(),
            environment: self.config.environment.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
