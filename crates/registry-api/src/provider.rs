//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Registry data access
//!
//! Handlers read through the `RegistryDataProvider` trait; the Kubernetes
//! implementation resolves the declaration's storage reference and reads the
//! canonical bytes from the storage ConfigMap. Every cluster call runs under
//! its own timeout.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use thiserror::Error;

use registry_core::v1alpha1::MCPRegistry;
use registry_core::REGISTRY_DATA_KEY;

/// Errors from registry data access
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The MCPRegistry resource does not exist
    #[error("Registry not found: {0}")]
    RegistryNotFound(String),

    /// No storage reference or storage artifact available
    #[error("Storage not found: {0}")]
    StorageNotFound(String),

    /// Cluster access failed or timed out
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the declaration and its stored registry data
#[async_trait]
pub trait RegistryDataProvider: Send + Sync {
    /// The MCPRegistry declaration being served
    async fn registry(&self) -> Result<MCPRegistry, ProviderError>;

    /// The stored canonical registry bytes
    async fn registry_data(&self) -> Result<Vec<u8>, ProviderError>;
}

/// Kubernetes-backed provider
pub struct KubeRegistryDataProvider {
    client: Client,
    registry_name: String,
    registry_namespace: String,
    cluster_timeout: Duration,
}

impl KubeRegistryDataProvider {
    pub fn new(
        client: Client,
        registry_name: impl Into<String>,
        registry_namespace: impl Into<String>,
        cluster_timeout: Duration,
    ) -> Self {
        Self {
            client,
            registry_name: registry_name.into(),
            registry_namespace: registry_namespace.into(),
            cluster_timeout,
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.cluster_timeout, fut).await {
            Ok(result) => result.map_err(|e| match e {
                kube::Error::Api(ref api_err) if api_err.code == 404 => {
                    ProviderError::RegistryNotFound(e.to_string())
                }
                _ => ProviderError::Unavailable(e.to_string()),
            }),
            Err(_) => Err(ProviderError::Unavailable(format!(
                "cluster call timed out after {:?}",
                self.cluster_timeout
            ))),
        }
    }
}

#[async_trait]
impl RegistryDataProvider for KubeRegistryDataProvider {
    async fn registry(&self) -> Result<MCPRegistry, ProviderError> {
        let api: Api<MCPRegistry> =
            Api::namespaced(self.client.clone(), &self.registry_namespace);
        self.with_timeout(api.get(&self.registry_name)).await
    }

    async fn registry_data(&self) -> Result<Vec<u8>, ProviderError> {
        let registry = self.registry().await?;

        let storage_ref = registry
            .status
            .as_ref()
            .and_then(|s| s.storage_ref.as_ref())
            .ok_or_else(|| {
                ProviderError::StorageNotFound(
                    "no storage reference found in registry status".to_string(),
                )
            })?;

        let cm_ref = storage_ref.config_map_ref.as_ref().ok_or_else(|| {
            ProviderError::StorageNotFound(
                "storage reference has no ConfigMap reference".to_string(),
            )
        })?;

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &cm_ref.namespace);
        let config_map = self
            .with_timeout(api.get(&cm_ref.name))
            .await
            .map_err(|e| match e {
                ProviderError::RegistryNotFound(msg) => ProviderError::StorageNotFound(msg),
                other => other,
            })?;

        let key = if cm_ref.key.is_empty() {
            REGISTRY_DATA_KEY
        } else {
            cm_ref.key.as_str()
        };

        config_map
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|data| data.clone().into_bytes())
            .ok_or_else(|| {
                ProviderError::StorageNotFound(format!(
                    "no registry data under key '{}' in storage ConfigMap '{}'",
                    key, cm_ref.name
                ))
            })
    }
}
