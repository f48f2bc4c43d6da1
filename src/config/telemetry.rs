//! Telemetry exporter configuration
//!
//! Endpoint selection order for each signal:
//!
//! 1. the signal-specific variable (`OTEL_TRACES_ENDPOINT`, `OTEL_METRICS_ENDPOINT`)
//! 2. the combined base `OTEL_EXPORTER_OTLP_ENDPOINT` plus `/v1/<signal>`
//! 3. the default collector base plus `/v1/<signal>`, which is the in-network
//!    collector when `ENVIRONMENT=local`
//!
//! A value that is not an `http`/`https` URL is skipped with a warning and the
//! next source in that order is used.

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use tracing::warn;

use super::is_truthy;
use crate::error::{Error, Result};

/// Collector address inside the local compose network.
pub const LOCAL_COLLECTOR_ENDPOINT: &str = "http://otel-collector:4318";

/// Collector address used outside of local mode when nothing is configured.
pub const REMOTE_COLLECTOR_ENDPOINT: &str = "http://localhost:4318";

/// Default metric export interval.
pub const DEFAULT_EXPORT_INTERVAL_MS: u64 = 5000;

/// Default `service.name` resource attribute.
pub const DEFAULT_SERVICE_NAME: &str = "statusd";

const TRACES_PATH: &str = "/v1/traces";
const METRICS_PATH: &str = "/v1/metrics";

/// Immutable telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryConfig {
    /// OTLP/HTTP traces endpoint
    pub traces_endpoint: String,

    /// OTLP/HTTP metrics endpoint
    pub metrics_endpoint: String,

    /// Flush interval in milliseconds
    pub export_interval_ms: u64,

    /// All OTLP exporters become no-ops
    pub otlp_disabled: bool,

    /// Also write exported payloads to the log
    pub console_export: bool,

    /// `service.name` resource attribute
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            traces_endpoint: format!("{}{}", REMOTE_COLLECTOR_ENDPOINT, TRACES_PATH),
            metrics_endpoint: format!("{}{}", REMOTE_COLLECTOR_ENDPOINT, METRICS_PATH),
            export_interval_ms: DEFAULT_EXPORT_INTERVAL_MS,
            otlp_disabled: false,
            console_export: true,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Resolve from the process environment
    pub fn from_env() -> Self {
        Self::resolve(super::process_env)
    }

    /// Resolve from an arbitrary environment lookup.
    ///
    /// Never fails: every malformed value falls back to its default.
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let local = lookup("ENVIRONMENT")
            .map(|env| env.trim() == "local")
            .unwrap_or(false);

        let default_base = if local {
            LOCAL_COLLECTOR_ENDPOINT
        } else {
            REMOTE_COLLECTOR_ENDPOINT
        };

        let base = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .and_then(|base| usable_endpoint("OTEL_EXPORTER_OTLP_ENDPOINT", &base))
            .unwrap_or_else(|| default_base.to_string());

        let traces_endpoint = signal_endpoint(&lookup, "OTEL_TRACES_ENDPOINT", &base, TRACES_PATH);
        let metrics_endpoint =
            signal_endpoint(&lookup, "OTEL_METRICS_ENDPOINT", &base, METRICS_PATH);

        let export_interval_ms = match lookup("OTEL_METRIC_EXPORT_INTERVAL") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    warn!(
                        "Ignoring OTEL_METRIC_EXPORT_INTERVAL={:?}, using {}ms",
                        raw, DEFAULT_EXPORT_INTERVAL_MS
                    );
                    DEFAULT_EXPORT_INTERVAL_MS
                }
            },
            None => DEFAULT_EXPORT_INTERVAL_MS,
        };

        let otlp_disabled = lookup("OTEL_EXPORTER_OTLP_DISABLED")
            .map(|raw| is_truthy(&raw))
            .unwrap_or(false);

        let console_export = lookup("OTEL_ENABLE_CONSOLE_EXPORTERS")
            .map(|raw| is_truthy(&raw))
            .unwrap_or(true);

        let service_name = lookup("OTEL_SERVICE_NAME")
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        Self {
            traces_endpoint,
            metrics_endpoint,
            export_interval_ms,
            otlp_disabled,
            console_export,
            service_name,
        }
    }

    /// Flush interval as a duration
    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }

    /// True if at least one exporter will run
    pub fn exports_anything(&self) -> bool {
        !self.otlp_disabled || self.console_export
    }
}

fn signal_endpoint<F>(lookup: &F, name: &str, base: &str, path: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|explicit| usable_endpoint(name, &explicit))
        .unwrap_or_else(|| format!("{}{}", base.trim_end_matches('/'), path))
}

/// The trimmed endpoint, or `None` after logging why it was skipped
fn usable_endpoint(name: &str, value: &str) -> Option<String> {
    match validate_endpoint(name, value) {
        Ok(()) => Some(value.trim().to_string()),
        Err(e) => {
            warn!("{}, using the next fallback", e);
            None
        }
    }
}

/// Check that `value` is an absolute `http`/`https` URL with a host
pub fn validate_endpoint(name: &str, value: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidEndpoint {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value.trim()).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }

    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
