//! Metrics Server
//!
//! Plain hyper HTTP/1 listener for Prometheus scrapes.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::ServiceMetrics;
use crate::error::Result;

/// Serve `GET /metrics` until `shutdown` is cancelled
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<ServiceMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Metrics server stopped");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = metrics_response(&metrics, req.method(), req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}

/// Build the response for one scrape request
pub fn metrics_response(
    metrics: &ServiceMetrics,
    method: &Method,
    path: &str,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => match metrics.encode() {
            Ok(buffer) => {
                let mut response = Response::new(Full::new(Bytes::from(buffer)));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(prometheus::TEXT_FORMAT),
                );
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "encode error")
            }
        },
        (_, "/metrics") => plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        _ => plain(StatusCode::NOT_FOUND, "not found"),
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_metrics_path_serves_text_format() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_health_call("/health", "healthy");

        let response = metrics_response(&metrics, &Method::GET, "/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            HeaderValue::from_static(prometheus::TEXT_FORMAT)
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("health_endpoint_calls_total"));
    }

    #[test]
    fn test_other_paths() {
        let metrics = ServiceMetrics::new().unwrap();
        assert_eq!(
            metrics_response(&metrics, &Method::GET, "/").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            metrics_response(&metrics, &Method::POST, "/metrics").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let metrics = Arc::new(ServiceMetrics::new().unwrap());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_metrics_server(
            "127.0.0.1:0".parse().unwrap(),
            metrics,
            shutdown.clone(),
        ));

        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
