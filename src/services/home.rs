//! Root endpoint payload

use serde::{Deserialize, Serialize};

use super::{HEALTH_PATH, STATUS_PATH};
use crate::config::APPLICATION_NAME;

/// Service identity and links to the other endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootInfo {
    pub message: String,
    pub health: String,
    pub status: String,
}

pub fn root_info() -> RootInfo {
    RootInfo {
        message: format!("Welcome to {}", APPLICATION_NAME),
        health: HEALTH_PATH.to_string(),
        status: STATUS_PATH.to_string(),
    }
}
