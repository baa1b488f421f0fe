//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Configuration for the registry API server

use std::time::Duration;

/// Registry API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Name of the MCPRegistry resource to serve
    pub registry_name: String,

    /// Namespace of the MCPRegistry resource
    pub registry_namespace: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// How long an idle keep-alive connection is held open
    pub idle_timeout: Duration,

    /// Timeout for individual cluster calls
    pub cluster_timeout: Duration,

    /// Deadline for graceful shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            registry_name: String::new(),
            registry_namespace: String::new(),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            cluster_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.registry_name.is_empty() {
            return Err("registry name is required".to_string());
        }
        if self.registry_namespace.is_empty() {
            return Err("registry namespace is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.cluster_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_requires_registry_identity() {
        let mut config = ApiConfig::default();
        assert!(config.validate().is_err());

        config.registry_name = "production".to_string();
        assert!(config.validate().is_err());

        config.registry_namespace = "toolhive-system".to_string();
        assert!(config.validate().is_ok());
    }
}
