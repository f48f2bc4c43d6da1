//! Telemetry Emitter
//!
//! Request metrics flow from the timing middleware into a [`TelemetrySink`].
//! The live sink aggregates them in a background worker and pushes OTLP/HTTP
//! JSON to the collector on a fixed interval.
//!
//! ```text
//! middleware ──try_send──▶ channel ──▶ BatchWorker ──tick──▶ exporters
//!                                      (MetricBatch)          ├─ OtlpHttpExporter
//!                                                             └─ ConsoleExporter
//! ```

pub mod batch;
pub mod exporter;
mod metric;
pub mod otlp;
mod sink;

pub use batch::{ExportPayload, MetricBatch};
pub use exporter::{ConsoleExporter, OtlpHttpExporter, TelemetryExporter};
pub use metric::{RequestMetric, UNMATCHED_ENDPOINT};
pub use sink::{LiveSink, TelemetrySink, CHANNEL_CAPACITY};

use crate::config::{ServiceConfig, TelemetryConfig};

/// Identity attached to every exported payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
}

impl Resource {
    pub fn new(telemetry: &TelemetryConfig, service: &ServiceConfig) -> Self {
        Self {
            service_name: telemetry.service_name.clone(),
            service_version: service.version.clone(),
            environment: service.environment.clone(),
        }
    }

    /// OTLP resource with semantic-convention attribute keys
    pub fn to_otlp(&self) -> otlp::Resource {
        otlp::Resource {
            attributes: vec![
                otlp::KeyValue::string("service.name", self.service_name.as_str()),
                otlp::KeyValue::string("service.version", self.service_version.as_str()),
                otlp::KeyValue::string(
                    "deployment.environment",
                    self.environment.as_str(),
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_attributes() {
        let telemetry = TelemetryConfig {
            service_name: "edge".to_string(),
            ..TelemetryConfig::default()
        };
        let service = ServiceConfig {
            environment: "staging".to_string(),
            ..ServiceConfig::default()
        };

        let resource = Resource::new(&telemetry, &service).to_otlp();
        assert_eq!(
            resource.attributes,
            vec![
                otlp::KeyValue::string("service.name", "edge"),
                otlp::KeyValue::string("service.version", env!("CARGO_PKG_VERSION")),
                otlp::KeyValue::string("deployment.environment", "staging"),
            ]
        );
    }
}
