//! statusd
//!
//! Health and status HTTP service with OTLP telemetry export.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         statusd                          │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────┐  │
//! │  │  HTTP API   │───▶│ TelemetrySink│───▶│  Collector  │  │
//! │  │ :8000       │    │  (batched)   │    │  OTLP/HTTP  │  │
//! │  └─────────────┘    └──────────────┘    └─────────────┘  │
//! │         │                                                │
//! │         ▼                                                │
//! │  ┌─────────────┐                                         │
//! │  │  /metrics   │  Prometheus scrape (:9464)              │
//! │  └─────────────┘                                         │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use statusd::config::{ServiceConfig, TelemetryConfig};
use statusd::metrics::{run_metrics_server, ServiceMetrics};
use statusd::middleware::cors_from_env;
use statusd::state::AppState;
use statusd::telemetry::{OtlpHttpExporter, Resource, TelemetrySink};

// =============================================================================
// CLI Arguments
// =============================================================================

/// statusd - health and status endpoints with OTLP telemetry
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP API bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: SocketAddr,

    /// Prometheus scrape bind address (empty disables the listener)
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9464")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Targets held at `warn` regardless of the chosen level
const QUIET_TARGETS: &[&str] = &["hyper=warn", "tower=warn", "reqwest=warn"];

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let telemetry_config = TelemetryConfig::from_env();
    let service_config = ServiceConfig::from_env();

    info!("Starting {} v{}", service_config.application, service_config.version);
    info!("  Environment: {}", service_config.environment);
    info!("  Service name: {}", telemetry_config.service_name);
    info!("  OTLP disabled: {}", telemetry_config.otlp_disabled);
    info!("  Console export: {}", telemetry_config.console_export);
    info!("  Traces endpoint: {}", telemetry_config.traces_endpoint);
    info!("  Metrics endpoint: {}", telemetry_config.metrics_endpoint);
    info!(
        "  Export interval: {} ms",
        telemetry_config.export_interval_ms
    );

    let metrics = Arc::new(ServiceMetrics::new().context("Failed to create metrics registry")?);

    // Telemetry sink
    let resource = Resource::new(&telemetry_config, &service_config);
    let otlp = OtlpHttpExporter::new(&telemetry_config)
        .context("Failed to create OTLP exporter")?;
    let telemetry = Arc::new(TelemetrySink::start(
        &telemetry_config,
        resource,
        Arc::new(otlp),
    ));

    // Start metrics server
    let shutdown = CancellationToken::new();
    if !args.metrics_addr.trim().is_empty() {
        let addr: SocketAddr = args
            .metrics_addr
            .trim()
            .parse()
            .with_context(|| format!("Invalid metrics server address: {}", args.metrics_addr))?;
        let metrics = metrics.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, token).await {
                error!("Metrics server error: {}", e);
            }
        });
    } else {
        info!("Metrics server disabled");
    }

    // Run the API
    let state = AppState::new(service_config, metrics, telemetry.clone());
    let app = statusd::router(state, cors_from_env());

    let listener = TcpListener::bind(args.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind_addr))?;
    info!("HTTP server listening on {}", args.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Flushing telemetry");
    telemetry.shutdown().await;
    shutdown.cancel();

    info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter =
        EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into());
    for directive in QUIET_TARGETS {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Signals
// =============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
