//! HTTP middleware

mod cors;
mod timing;

pub use cors::{cors_from_env, cors_layer};
pub use timing::{panic_response, record_request_timing, PROCESS_TIME_HEADER};
