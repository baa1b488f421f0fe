//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Registry data storage
//!
//! Synced canonical registry bytes are persisted in a ConfigMap named after
//! the declaration. The ConfigMap carries a controller reference so deletion
//! of the declaration cascades to the stored data.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use thiserror::Error;
use tracing::{debug, info};

use registry_core::v1alpha1::{ConfigMapReference, MCPRegistry, StorageReference};
use registry_core::REGISTRY_DATA_KEY;

/// Suffix appended to the declaration name for the storage ConfigMap
const STORAGE_NAME_SUFFIX: &str = "-registry-storage";

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage artifact does not exist
    #[error("Storage not found: {message}")]
    NotFound { message: String },

    /// Storage read or write failed
    #[error("Storage error: {message}")]
    Failed { message: String },
}

impl StorageError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Interface for persisting and retrieving canonical registry bytes
#[async_trait]
pub trait StorageManager: Send + Sync {
    /// Persist canonical registry bytes for the declaration
    async fn store(&self, registry: &MCPRegistry, data: &[u8]) -> Result<(), StorageError>;

    /// Retrieve the stored canonical bytes
    async fn get(&self, registry: &MCPRegistry) -> Result<Vec<u8>, StorageError>;

    /// Remove the stored data; not-found is not an error
    async fn delete(&self, registry: &MCPRegistry) -> Result<(), StorageError>;

    /// Reference to where the data is stored; pure, no I/O
    fn storage_reference(&self, registry: &MCPRegistry) -> StorageReference;
}

/// ConfigMap-backed storage manager
pub struct ConfigMapStorageManager {
    client: Client,
}

impl ConfigMapStorageManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, registry: &MCPRegistry) -> Result<Api<ConfigMap>, StorageError> {
        let namespace = registry
            .namespace()
            .ok_or_else(|| StorageError::failed("registry has no namespace"))?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

/// Name of the storage ConfigMap for a declaration
pub fn storage_configmap_name(registry: &MCPRegistry) -> String {
    format!("{}{}", registry.name_any(), STORAGE_NAME_SUFFIX)
}

/// Labels stamped on the storage ConfigMap
pub fn storage_labels(registry: &MCPRegistry) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            "toolhive-registry".to_string(),
        ),
        (
            "app.kubernetes.io/component".to_string(),
            "storage".to_string(),
        ),
        ("app.kubernetes.io/part-of".to_string(), "toolhive".to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            "toolhive-operator".to_string(),
        ),
        (
            "toolhive.stacklok.dev/registry".to_string(),
            registry.name_any(),
        ),
    ])
}

/// Annotations stamped on the storage ConfigMap
pub fn storage_annotations(registry: &MCPRegistry) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "toolhive.stacklok.dev/registry-name".to_string(),
            registry.name_any(),
        ),
        (
            "toolhive.stacklok.dev/registry-format".to_string(),
            registry.spec.source.effective_format().to_string(),
        ),
        (
            "toolhive.stacklok.dev/storage-type".to_string(),
            "registry-data".to_string(),
        ),
    ])
}

#[async_trait]
impl StorageManager for ConfigMapStorageManager {
    async fn store(&self, registry: &MCPRegistry, data: &[u8]) -> Result<(), StorageError> {
        let api = self.api(registry)?;
        let name = storage_configmap_name(registry);

        let payload = String::from_utf8(data.to_vec())
            .map_err(|_| StorageError::failed("registry data is not valid UTF-8"))?;

        let owner_ref = registry
            .controller_owner_ref(&())
            .ok_or_else(|| StorageError::failed("registry has no uid for owner reference"))?;

        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: registry.namespace(),
                labels: Some(storage_labels(registry)),
                annotations: Some(storage_annotations(registry)),
                owner_references: Some(vec![owner_ref]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                REGISTRY_DATA_KEY.to_string(),
                payload,
            )])),
            ..Default::default()
        };

        match api.get_opt(&name).await {
            Ok(Some(mut existing)) => {
                debug!(configmap = %name, "Updating storage ConfigMap");
                existing.data = config_map.data.clone();
                existing.metadata.labels = config_map.metadata.labels.clone();
                existing.metadata.annotations = config_map.metadata.annotations.clone();
                api.replace(&name, &PostParams::default(), &existing)
                    .await
                    .map_err(|e| {
                        StorageError::failed(format!("failed to update storage ConfigMap: {}", e))
                    })?;
            }
            Ok(None) => {
                debug!(configmap = %name, "Creating storage ConfigMap");
                api.create(&PostParams::default(), &config_map)
                    .await
                    .map_err(|e| {
                        StorageError::failed(format!("failed to create storage ConfigMap: {}", e))
                    })?;
            }
            Err(e) => {
                return Err(StorageError::failed(format!(
                    "failed to read storage ConfigMap: {}",
                    e
                )));
            }
        }

        info!(
            registry = %registry.name_any(),
            configmap = %name,
            "Stored registry data"
        );
        Ok(())
    }

    async fn get(&self, registry: &MCPRegistry) -> Result<Vec<u8>, StorageError> {
        let api = self.api(registry)?;
        let name = storage_configmap_name(registry);

        let config_map = api
            .get_opt(&name)
            .await
            .map_err(|e| StorageError::failed(format!("failed to read storage ConfigMap: {}", e)))?
            .ok_or_else(|| {
                StorageError::not_found(format!("storage ConfigMap '{}' not found", name))
            })?;

        let data = config_map
            .data
            .as_ref()
            .and_then(|d| d.get(REGISTRY_DATA_KEY))
            .ok_or_else(|| {
                StorageError::failed(format!(
                    "data key '{}' not found in storage ConfigMap '{}'",
                    REGISTRY_DATA_KEY, name
                ))
            })?;

        Ok(data.clone().into_bytes())
    }

    async fn delete(&self, registry: &MCPRegistry) -> Result<(), StorageError> {
        let api = self.api(registry)?;
        let name = storage_configmap_name(registry);

        match api.delete(&name, &Default::default()).await {
            Ok(_) => {
                info!(configmap = %name, "Deleted storage ConfigMap");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(configmap = %name, "Storage ConfigMap already deleted");
                Ok(())
            }
            Err(e) => Err(StorageError::failed(format!(
                "failed to delete storage ConfigMap: {}",
                e
            ))),
        }
    }

    fn storage_reference(&self, registry: &MCPRegistry) -> StorageReference {
        storage_reference(registry)
    }
}

/// Reference to the storage location for a declaration; pure, no I/O
pub fn storage_reference(registry: &MCPRegistry) -> StorageReference {
    StorageReference {
        storage_type: "configmap".to_string(),
        config_map_ref: Some(ConfigMapReference {
            name: storage_configmap_name(registry),
            namespace: registry.namespace().unwrap_or_default(),
            key: REGISTRY_DATA_KEY.to_string(),
        }),
    }
}
