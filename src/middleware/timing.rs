//! Request timing
//!
//! Runs outside the panic catcher, so a failing handler is still timed,
//! labelled with its 500 and recorded before the response leaves.

use std::any::Any;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::state::AppState;
use crate::telemetry::{RequestMetric, UNMATCHED_ENDPOINT};

/// Response header carrying the processing time in milliseconds
pub const PROCESS_TIME_HEADER: &str = "x-process-time-ms";

/// Time the request, attach the header and feed both metric pipelines
pub async fn record_request_timing(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());
    let method = request.method().to_string();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let header = format!("{:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(value) = HeaderValue::from_str(&header) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    let metric = RequestMetric::new(endpoint, method, response.status().as_u16(), elapsed);
    state.metrics.observe_request(&metric);
    if let Err(e) = state.telemetry.record(metric) {
        warn!("Request metric rejected: {}", e);
    }

    response
}

/// Generic 500 for a panicking handler
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!("Handler panicked: {}", message);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"detail": "Internal Server Error"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_response_is_generic() {
        let response = panic_response(Box::new("secret detail"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = panic_response(Box::new(String::from("boom")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = panic_response(Box::new(7_u32));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
