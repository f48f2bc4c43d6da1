//! CORS policy from `CORS_ALLOWED_ORIGINS`

use axum::http::{HeaderName, HeaderValue};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::warn;

use super::PROCESS_TIME_HEADER;
use crate::config::process_env;

/// CORS layer for the origins in `CORS_ALLOWED_ORIGINS`
pub fn cors_from_env() -> CorsLayer {
    cors_layer(process_env("CORS_ALLOWED_ORIGINS").as_deref())
}

/// Build the CORS layer for a comma-separated origin list.
///
/// No usable origin means any origin without credentials. An explicit list
/// allows credentials and mirrors the requested method and headers.
pub fn cors_layer(raw_origins: Option<&str>) -> CorsLayer {
    let expose = [HeaderName::from_static(PROCESS_TIME_HEADER)];

    let origins: Vec<HeaderValue> = raw_origins
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers(expose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(raw: Option<&str>) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(cors_layer(raw))
    }

    #[tokio::test]
    async fn test_any_origin_by_default() {
        let response = app(None)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://dashboard.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS],
            PROCESS_TIME_HEADER
        );
    }

    #[tokio::test]
    async fn test_explicit_origins() {
        let raw = Some("https://a.example.com, https://b.example.com,,");

        let allowed = app(raw)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .header(header::ORIGIN, "https://b.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://b.example.com"
        );
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );

        let denied = app(raw)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(denied
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
