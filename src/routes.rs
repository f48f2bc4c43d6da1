//! HTTP routes
//!
//! | Method | Path      | Response       |
//! |--------|-----------|----------------|
//! | GET    | `/`       | [`RootInfo`]     |
//! | GET    | `/health` | [`HealthStatus`] |
//! | GET    | `/status` | [`StatusReport`] |

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{panic_response, record_request_timing};
use crate::services::{
    root_info, HealthStatus, RootInfo, StatusReport, HEALTH_PATH, STATUS_PATH,
};
use crate::state::AppState;

/// Responses smaller than this are sent uncompressed
pub const COMPRESSION_MIN_SIZE: u16 = 1024;

/// The full application
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    with_middleware(api_routes(), state, cors)
}

/// Route table without middleware
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route(HEALTH_PATH, get(health_check))
        .route(STATUS_PATH, get(status_check))
        .fallback(not_found)
}

/// Wrap `routes` in the service middleware stack.
///
/// Innermost first: panic catcher, compression, CORS, request timing,
/// request tracing. Timing sits outside CORS so preflight answers are timed
/// as well.
pub fn with_middleware(routes: Router<AppState>, state: AppState, cors: CorsLayer) -> Router {
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(COMPRESSION_MIN_SIZE)))
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            record_request_timing,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<RootInfo> {
    Json(root_info())
}

async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health.check_health())
}

async fn status_check(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.status.get_status())
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"})))
}
