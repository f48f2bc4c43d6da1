//! statusd - Health & Telemetry Reporting Service
//!
//! A small HTTP service exposing `/`, `/health` and `/status`, instrumented
//! with request timing, Prometheus exposition and OTLP/HTTP export of metrics
//! and server spans.
//!
//! # Architecture
//!
//! ```text
//! request ─▶ Timing Middleware ─▶ route handler ─▶ Timing Middleware ─▶ response
//!            (start clock)        (Health/Status)   (stop clock, header)
//!                                                        │
//!                                    ┌───────────────────┴──────────────┐
//!                                    ▼                                  ▼
//!                             ServiceMetrics                     TelemetrySink
//!                           (Prometheus pull)               (OTLP push, batched)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Environment-driven configuration, resolved once
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus registry and scrape listener
//! - [`middleware`] - Request timing and CORS
//! - [`routes`] - Route table and middleware stack
//! - [`services`] - Health, status and root payloads
//! - [`state`] - Shared application state
//! - [`telemetry`] - Batched OTLP export

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ServiceConfig, TelemetryConfig};
pub use error::{Error, Result};
pub use metrics::ServiceMetrics;
pub use routes::router;
pub use services::{HealthService, HealthStatus, StatusReport, StatusService};
pub use state::AppState;
pub use telemetry::{RequestMetric, TelemetrySink};
