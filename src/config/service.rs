//! Service identity reported by `/status`

use serde::Serialize;

/// Application name reported in status payloads
pub const APPLICATION_NAME: &str = "statusd";

const DEFAULT_ENVIRONMENT: &str = "development";

/// Static identity of the running service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    /// Deployment environment (`ENVIRONMENT`)
    pub environment: String,

    /// Build version
    pub version: String,

    /// Application name
    pub application: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            application: APPLICATION_NAME.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Resolve from the process environment
    pub fn from_env() -> Self {
        Self::resolve(super::process_env)
    }

    /// Resolve from an arbitrary environment lookup
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .map(|env| env.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        Self {
            environment,
            ..Self::default()
        }
    }

    /// True when running inside the local compose network
    pub fn is_local(&self) -> bool {
        self.environment == "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_environment() {
        let config = ServiceConfig::resolve(|_| None);
        assert_eq!(config.environment, "development");
        assert_eq!(config.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.application, "statusd");
        assert!(!config.is_local());
    }

    #[test]
    fn test_environment_from_lookup() {
        let config = ServiceConfig::resolve(|key| match key {
            "ENVIRONMENT" => Some("local".to_string()),
            _ => None,
        });
        assert_eq!(config.environment, "local");
        assert!(config.is_local());
    }
}
