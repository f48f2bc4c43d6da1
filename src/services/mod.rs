//! Route-independent service logic
//!
//! Handlers in [`crate::routes`] are thin wrappers over these.

mod health;
mod home;
mod status;

pub use health::{HealthService, HealthState, HealthStatus, HEALTH_PATH};
pub use home::{root_info, RootInfo};
pub use status::{ServiceState, StatusReport, StatusService, STATUS_PATH};
