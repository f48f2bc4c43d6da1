//! Configuration resolved once at startup
//!
//! Everything here is read from the process environment exactly once and then
//! passed around by reference. Resolvers take a lookup function instead of
//! reading `std::env` directly so tests never mutate process state.

mod service;
mod telemetry;

pub use service::{ServiceConfig, APPLICATION_NAME};
pub use telemetry::{
    TelemetryConfig, DEFAULT_EXPORT_INTERVAL_MS, DEFAULT_SERVICE_NAME, LOCAL_COLLECTOR_ENDPOINT,
    REMOTE_COLLECTOR_ENDPOINT,
};

/// Tokens accepted as "on" for boolean switches.
pub const TRUTHY_TOKENS: [&str; 4] = ["true", "1", "yes", "on"];

/// Returns true if `raw` is one of [`TRUTHY_TOKENS`], ignoring case and
/// surrounding whitespace.
pub fn is_truthy(raw: &str) -> bool {
    let trimmed = raw.trim();
    TRUTHY_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Environment lookup backed by the real process environment.
///
/// Empty values are treated the same as unset ones.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
