//! Telemetry sink and its flush worker

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::batch::MetricBatch;
use super::exporter::{ConsoleExporter, TelemetryExporter};
use super::{RequestMetric, Resource};
use crate::config::TelemetryConfig;
use crate::error::Result;

/// Observations queued between the request path and the worker
pub const CHANNEL_CAPACITY: usize = 4096;

/// One unit of work for the flush worker
#[derive(Debug)]
enum Observation {
    Request(RequestMetric),
    HealthCall {
        endpoint: String,
        status: &'static str,
    },
}

/// Where request metrics go.
///
/// Chosen once at startup; call sites never branch on configuration.
pub enum TelemetrySink {
    /// No exporter configured. Metrics are validated and dropped.
    Disabled,
    /// Metrics are batched and flushed on a fixed interval.
    Live(LiveSink),
}

impl TelemetrySink {
    /// Select the sink for `config`.
    ///
    /// `otlp` is only used when OTLP export is enabled. Must be called from
    /// within a tokio runtime.
    pub fn start(
        config: &TelemetryConfig,
        resource: Resource,
        otlp: Arc<dyn TelemetryExporter>,
    ) -> Self {
        if !config.exports_anything() {
            info!("Telemetry export disabled");
            return Self::Disabled;
        }

        let mut exporters: Vec<Arc<dyn TelemetryExporter>> = Vec::new();
        if !config.otlp_disabled {
            exporters.push(otlp);
        }
        if config.console_export {
            exporters.push(Arc::new(ConsoleExporter));
        }
        Self::with_exporters(config.export_interval(), resource, exporters)
    }

    /// Start a sink over an explicit exporter list; empty means disabled
    pub fn with_exporters(
        interval: Duration,
        resource: Resource,
        exporters: Vec<Arc<dyn TelemetryExporter>>,
    ) -> Self {
        if exporters.is_empty() {
            info!("Telemetry export disabled");
            return Self::Disabled;
        }

        let names: Vec<&str> = exporters.iter().map(|e| e.name()).collect();
        info!(
            "Telemetry export enabled: exporters={:?} interval={:?}",
            names, interval
        );

        Self::Live(LiveSink::spawn(interval, resource, exporters))
    }

    /// Hand one metric to the sink.
    ///
    /// Fails only on a malformed metric. Never waits on export.
    pub fn record(&self, metric: RequestMetric) -> Result<()> {
        metric.validate()?;
        if let Self::Live(live) = self {
            live.enqueue(Observation::Request(metric));
        }
        Ok(())
    }

    /// Count one health check result under `endpoint`/`status`
    pub fn record_health_call(&self, endpoint: &str, status: &'static str) {
        if let Self::Live(live) = self {
            live.enqueue(Observation::HealthCall {
                endpoint: endpoint.to_string(),
                status,
            });
        }
    }

    /// True for the live variant
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Observations dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        match self {
            Self::Disabled => 0,
            Self::Live(live) => live.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker after draining the queue and flushing once more
    pub async fn shutdown(&self) {
        if let Self::Live(live) = self {
            live.shutdown().await;
        }
    }
}

impl std::fmt::Debug for TelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "TelemetrySink::Disabled"),
            Self::Live(_) => write!(f, "TelemetrySink::Live"),
        }
    }
}

/// Handle to a running flush worker
pub struct LiveSink {
    tx: mpsc::Sender<Observation>,
    dropped: Arc<AtomicU64>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LiveSink {
    fn spawn(
        interval: Duration,
        resource: Resource,
        exporters: Vec<Arc<dyn TelemetryExporter>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let worker = BatchWorker {
            rx,
            batch: MetricBatch::new(Utc::now()),
            resource,
            exporters,
            interval,
            shutdown: shutdown.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            shutdown,
            worker: Mutex::new(Some(handle)),
        }
    }

    fn enqueue(&self, observation: Observation) {
        match self.tx.try_send(observation) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Telemetry queue full, observation dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Telemetry worker stopped, observation dropped");
            }
        }
    }

    async fn shutdown(&self) {
        let handle = self.worker.lock().take();
        self.shutdown.cancel();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Telemetry worker ended abnormally: {}", e);
            }
        }
    }
}

struct BatchWorker {
    rx: mpsc::Receiver<Observation>,
    batch: MetricBatch,
    resource: Resource,
    exporters: Vec<Arc<dyn TelemetryExporter>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl BatchWorker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.flush().await,
                received = self.rx.recv() => match received {
                    Some(observation) => self.observe(observation),
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(observation) = self.rx.try_recv() {
            self.observe(observation);
        }
        self.flush().await;
        debug!("Telemetry worker stopped");
    }

    fn observe(&mut self, observation: Observation) {
        match observation {
            Observation::Request(metric) => self.batch.record(metric),
            Observation::HealthCall { endpoint, status } => {
                self.batch.record_health_call(&endpoint, status)
            }
        }
    }

    #[instrument(skip(self), fields(exporters = self.exporters.len()))]
    async fn flush(&mut self) {
        let Some(payload) = self.batch.take_export(&self.resource, Utc::now()) else {
            return;
        };

        for exporter in &self.exporters {
            if let Err(e) = exporter.export_metrics(&payload.metrics).await {
                warn!("Dropping metrics batch, {} export failed: {}", exporter.name(), e);
            }
            if let Some(traces) = &payload.traces {
                if let Err(e) = exporter.export_traces(traces).await {
                    warn!("Dropping span batch, {} export failed: {}", exporter.name(), e);
                }
            }
        }

        let dropped_spans = self.batch.dropped_spans();
        if dropped_spans > 0 {
            debug!("Spans dropped so far: {}", dropped_spans);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::telemetry::batch::{CALLS_METRIC, REQUESTS_METRIC};
    use crate::telemetry::otlp::{
        ExportMetricsServiceRequest, ExportTraceServiceRequest, MetricData,
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingExporter {
        metrics: Mutex<Vec<ExportMetricsServiceRequest>>,
        traces: Mutex<Vec<ExportTraceServiceRequest>>,
        fail: bool,
    }

    impl RecordingExporter {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn metric_calls(&self) -> usize {
            self.metrics.lock().len()
        }

        fn trace_calls(&self) -> usize {
            self.traces.lock().len()
        }
    }

    #[async_trait]
    impl TelemetryExporter for RecordingExporter {
        fn name(&self) -> &str {
            "recording"
        }

        async fn export_metrics(&self, request: &ExportMetricsServiceRequest) -> Result<()> {
            self.metrics.lock().push(request.clone());
            if self.fail {
                return Err(Error::Export {
                    target: "stub".to_string(),
                    reason: "refused".to_string(),
                });
            }
            Ok(())
        }

        async fn export_traces(&self, request: &ExportTraceServiceRequest) -> Result<()> {
            self.traces.lock().push(request.clone());
            Ok(())
        }
    }

    fn resource() -> Resource {
        Resource {
            service_name: "statusd".to_string(),
            service_version: "0.1.0".to_string(),
            environment: "test".to_string(),
        }
    }

    fn config(interval_ms: u64, otlp_disabled: bool) -> TelemetryConfig {
        TelemetryConfig {
            export_interval_ms: interval_ms,
            otlp_disabled,
            console_export: false,
            ..TelemetryConfig::default()
        }
    }

    fn request(endpoint: &str) -> RequestMetric {
        RequestMetric::new(endpoint, "GET", 200, Duration::from_millis(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_sink_never_exports() {
        let stub = Arc::new(RecordingExporter::default());
        let sink = TelemetrySink::start(&config(1000, true), resource(), stub.clone());

        assert!(!sink.is_enabled());
        for _ in 0..5 {
            sink.record(request("/health")).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        sink.shutdown().await;

        assert_eq!(stub.metric_calls(), 0);
        assert_eq!(stub.trace_calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_sink_still_validates() {
        let sink = TelemetrySink::Disabled;
        let mut bad = request("/health");
        bad.status_code = 42;
        assert_matches!(sink.record(bad), Err(Error::InvalidMetric(_)));
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_once_per_interval() {
        let stub = Arc::new(RecordingExporter::default());
        let sink = TelemetrySink::start(&config(1000, false), resource(), stub.clone());
        assert!(sink.is_enabled());

        for _ in 0..5 {
            sink.record(request("/health")).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stub.metric_calls(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(stub.metric_calls(), 1);
        assert_eq!(stub.trace_calls(), 1);

        // Nothing new, nothing exported
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(stub.metric_calls(), 1);

        sink.record(request("/status")).unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(stub.metric_calls(), 2);

        let exported = stub.metrics.lock()[0].clone();
        let MetricData::Sum(sum) = &exported.metric(REQUESTS_METRIC).unwrap().data else {
            panic!("requests metric should be a sum");
        };
        assert_eq!(sum.data_points[0].as_int, "5");
        assert!(exported.metric(CALLS_METRIC).is_none());

        sink.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_failure_is_swallowed() {
        let stub = Arc::new(RecordingExporter::failing());
        let sink = TelemetrySink::start(&config(1000, false), resource(), stub.clone());

        sink.record(request("/health")).unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(stub.metric_calls(), 1);

        sink.record(request("/health")).unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(stub.metric_calls(), 2);

        sink.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending() {
        let stub = Arc::new(RecordingExporter::default());
        let sink = TelemetrySink::start(&config(60_000, false), resource(), stub.clone());

        for _ in 0..3 {
            sink.record(request("/status")).unwrap();
        }
        sink.shutdown().await;

        assert_eq!(stub.metric_calls(), 1);
        assert_eq!(stub.traces.lock()[0].spans().count(), 3);

        // Worker is gone; further metrics are counted as dropped
        sink.record(request("/status")).unwrap();
        assert_eq!(sink.dropped(), 1);
    }

    #[tokio::test]
    async fn test_console_only_is_live() {
        let stub = Arc::new(RecordingExporter::default());
        let config = TelemetryConfig {
            otlp_disabled: true,
            console_export: true,
            ..TelemetryConfig::default()
        };
        let sink = TelemetrySink::start(&config, resource(), stub.clone());
        assert!(sink.is_enabled());

        sink.record(request("/health")).unwrap();
        sink.shutdown().await;
        assert_eq!(stub.metric_calls(), 0);
    }

    #[tokio::test]
    async fn test_health_calls_reach_the_calls_metric() {
        let stub = Arc::new(RecordingExporter::default());
        let sink = TelemetrySink::start(&config(60_000, false), resource(), stub.clone());

        sink.record_health_call("/health", "healthy");
        sink.record_health_call("/health", "healthy");
        sink.record(request("/status")).unwrap();
        sink.shutdown().await;

        let exported = stub.metrics.lock()[0].clone();
        let MetricData::Sum(sum) = &exported.metric(CALLS_METRIC).unwrap().data else {
            panic!("calls metric should be a sum");
        };
        assert_eq!(sum.data_points.len(), 1);
        assert_eq!(sum.data_points[0].as_int, "2");
    }

    #[test]
    fn test_disabled_sink_ignores_health_calls() {
        let sink = TelemetrySink::Disabled;
        sink.record_health_call("/health", "healthy");
        assert_eq!(sink.dropped(), 0);
    }
}
