//! Error types for statusd

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in statusd
#[derive(Error, Debug)]
pub enum Error {
    /// An OTLP endpoint that was set explicitly but cannot be used
    #[error("Invalid endpoint {name}={value:?}: {reason}")]
    InvalidEndpoint {
        name: String,
        value: String,
        reason: String,
    },

    /// A request metric failed shape validation
    #[error("Invalid request metric: {0}")]
    InvalidMetric(String),

    /// Telemetry export failed
    #[error("Export to {target} failed: {reason}")]
    Export { target: String, reason: String },

    /// Prometheus registry error
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_endpoint_display() {
        let err = Error::InvalidEndpoint {
            name: "OTEL_METRICS_ENDPOINT".to_string(),
            value: "collector".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid endpoint OTEL_METRICS_ENDPOINT=\"collector\": relative URL without a base"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
