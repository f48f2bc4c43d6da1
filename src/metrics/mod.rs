//! Prometheus exposition
//!
//! Pull-side counterpart of the OTLP exporter: an owned registry updated on
//! every request and a small hyper listener serving it at `/metrics`.

mod registry;
mod server;

pub use registry::{ServiceMetrics, HEALTH_CALLS_METRIC};
pub use server::{metrics_response, run_metrics_server};
