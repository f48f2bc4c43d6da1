//! Export targets for flushed batches

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use super::otlp::{ExportMetricsServiceRequest, ExportTraceServiceRequest};
use crate::config::TelemetryConfig;
use crate::error::{Error, Result};

/// Per-request timeout towards the collector
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives flushed telemetry.
///
/// Implementations must not retry; the worker logs failures and moves on.
#[async_trait]
pub trait TelemetryExporter: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Deliver one metrics payload
    async fn export_metrics(&self, request: &ExportMetricsServiceRequest) -> Result<()>;

    /// Deliver one traces payload
    async fn export_traces(&self, request: &ExportTraceServiceRequest) -> Result<()>;
}

// =============================================================================
// OTLP/HTTP
// =============================================================================

/// Pushes JSON-encoded OTLP to a collector
pub struct OtlpHttpExporter {
    client: Client,
    metrics_endpoint: String,
    traces_endpoint: String,
}

impl OtlpHttpExporter {
    /// Create an exporter for the configured endpoints
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(EXPORT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            metrics_endpoint: config.metrics_endpoint.clone(),
            traces_endpoint: config.traces_endpoint.clone(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Export {
                target: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Export {
                target: url.to_string(),
                reason: format!("collector responded {}", status),
            });
        }

        debug!("Exported to {} ({})", url, status);
        Ok(())
    }
}

impl std::fmt::Debug for OtlpHttpExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtlpHttpExporter")
            .field("metrics_endpoint", &self.metrics_endpoint)
            .field("traces_endpoint", &self.traces_endpoint)
            .finish()
    }
}

#[async_trait]
impl TelemetryExporter for OtlpHttpExporter {
    fn name(&self) -> &str {
        "otlp-http"
    }

    async fn export_metrics(&self, request: &ExportMetricsServiceRequest) -> Result<()> {
        self.post(&self.metrics_endpoint, request).await
    }

    async fn export_traces(&self, request: &ExportTraceServiceRequest) -> Result<()> {
        self.post(&self.traces_endpoint, request).await
    }
}

// =============================================================================
// Console
// =============================================================================

/// Writes payloads to the log for local debugging
#[derive(Debug, Default)]
pub struct ConsoleExporter;

#[async_trait]
impl TelemetryExporter for ConsoleExporter {
    fn name(&self) -> &str {
        "console"
    }

    async fn export_metrics(&self, request: &ExportMetricsServiceRequest) -> Result<()> {
        let payload = serde_json::to_string(request)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        info!(target: "statusd::telemetry::console", signal = "metrics", "{}", payload);
        Ok(())
    }

    async fn export_traces(&self, request: &ExportTraceServiceRequest) -> Result<()> {
        let payload = serde_json::to_string(request)
            .map_err(|e| Error::Internal(format!("Failed to encode traces: {}", e)))?;
        info!(target: "statusd::telemetry::console", signal = "traces", "{}", payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_otlp_exporter_uses_config_endpoints() {
        let config = TelemetryConfig {
            metrics_endpoint: "http://collector:4318/v1/metrics".to_string(),
            traces_endpoint: "http://collector:4318/v1/traces".to_string(),
            ..TelemetryConfig::default()
        };
        let exporter = OtlpHttpExporter::new(&config).unwrap();
        assert_eq!(exporter.name(), "otlp-http");
        assert_eq!(exporter.metrics_endpoint, config.metrics_endpoint);
        assert_eq!(exporter.traces_endpoint, config.traces_endpoint);
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_export_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = TelemetryConfig {
            metrics_endpoint: format!("http://127.0.0.1:{}/v1/metrics", port),
            ..TelemetryConfig::default()
        };
        let exporter = OtlpHttpExporter::new(&config).unwrap();
        let request = ExportMetricsServiceRequest {
            resource_metrics: vec![],
        };

        let err = exporter.export_metrics(&request).await.unwrap_err();
        assert_matches!(err, Error::Export { ref target, .. } if target.ends_with("/v1/metrics"));
    }

    #[tokio::test]
    async fn test_collector_error_status_is_export_error() {
        use axum::{http::StatusCode, routing::post, Router};

        let app = Router::new().route(
            "/v1/traces",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = TelemetryConfig {
            traces_endpoint: format!("http://{}/v1/traces", addr),
            ..TelemetryConfig::default()
        };
        let exporter = OtlpHttpExporter::new(&config).unwrap();
        let request = ExportTraceServiceRequest {
            resource_spans: vec![],
        };

        let err = exporter.export_traces(&request).await.unwrap_err();
        assert_matches!(err, Error::Export { ref reason, .. } if reason.contains("503"));
    }

    #[tokio::test]
    async fn test_console_exporter_never_fails() {
        let exporter = ConsoleExporter;
        let metrics = ExportMetricsServiceRequest {
            resource_metrics: vec![],
        };
        let traces = ExportTraceServiceRequest {
            resource_spans: vec![],
        };
        assert!(exporter.export_metrics(&metrics).await.is_ok());
        assert!(exporter.export_traces(&traces).await.is_ok());
    }
}
