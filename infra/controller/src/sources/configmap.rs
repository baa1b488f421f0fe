//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! ConfigMap source handler

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use registry_core::v1alpha1::{ConfigMapSource, MCPRegistry, MCPRegistrySource, SourceType};

use super::{payload_hash, process_payload, FetchResult, SourceError, SourceHandler};

/// Reads registry data from a key in a ConfigMap
pub struct ConfigMapSourceHandler {
    client: Client,
}

/// Check the source block for the configmap type and return it
fn configmap_source(source: &MCPRegistrySource) -> Result<&ConfigMapSource, SourceError> {
    if source.source_type != SourceType::Configmap {
        return Err(SourceError::validation(
            SourceType::Configmap,
            format!("source type mismatch: got {}", source.source_type),
        ));
    }
    let cm_source = source.configmap.as_ref().ok_or_else(|| {
        SourceError::validation(SourceType::Configmap, "configmap configuration is required")
    })?;
    if cm_source.name.is_empty() {
        return Err(SourceError::validation(
            SourceType::Configmap,
            "configmap name is required",
        ));
    }
    if cm_source.key.is_empty() {
        return Err(SourceError::validation(
            SourceType::Configmap,
            "configmap key is required",
        ));
    }
    Ok(cm_source)
}

impl ConfigMapSourceHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Read the raw payload from the referenced ConfigMap key
    async fn read_payload(&self, registry: &MCPRegistry) -> Result<Vec<u8>, SourceError> {
        let cm_source = configmap_source(&registry.spec.source)?;
        let namespace = cm_source
            .namespace
            .clone()
            .or_else(|| registry.namespace())
            .ok_or_else(|| {
                SourceError::validation(SourceType::Configmap, "registry has no namespace")
            })?;

        debug!(
            configmap = %cm_source.name,
            namespace = %namespace,
            key = %cm_source.key,
            "Fetching source ConfigMap"
        );

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        let config_map = match api.get(&cm_source.name).await {
            Ok(cm) => cm,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Err(SourceError::not_found(format!(
                    "ConfigMap '{}' not found in namespace '{}'",
                    cm_source.name, namespace
                )));
            }
            Err(e) => {
                return Err(SourceError::fetch(format!(
                    "failed to fetch ConfigMap '{}': {}",
                    cm_source.name, e
                )));
            }
        };

        let data = config_map
            .data
            .as_ref()
            .and_then(|d| d.get(&cm_source.key))
            .ok_or_else(|| {
                SourceError::not_found(format!(
                    "key '{}' not found in ConfigMap '{}'",
                    cm_source.key, cm_source.name
                ))
            })?;

        Ok(data.clone().into_bytes())
    }
}

#[async_trait]
impl SourceHandler for ConfigMapSourceHandler {
    fn validate(&self, source: &MCPRegistrySource) -> Result<(), SourceError> {
        configmap_source(source).map(|_| ())
    }

    async fn fetch_registry(&self, registry: &MCPRegistry) -> Result<FetchResult, SourceError> {
        let payload = self.read_payload(registry).await?;
        let result = process_payload(&payload, registry.spec.source.effective_format())?;

        info!(
            registry = %registry.name_any(),
            servers = result.server_count,
            format = %result.format,
            hash = %&result.hash[..8],
            "Fetched registry data from ConfigMap source"
        );

        Ok(result)
    }

    async fn current_hash(&self, registry: &MCPRegistry) -> Result<String, SourceError> {
        let payload = self.read_payload(registry).await?;
        Ok(payload_hash(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::v1alpha1::UrlSource;

    fn source(configmap: Option<ConfigMapSource>) -> MCPRegistrySource {
        MCPRegistrySource {
            source_type: SourceType::Configmap,
            format: None,
            configmap,
            url: None,
            git: None,
            registry: None,
        }
    }

    #[test]
    fn test_validate_requires_configmap_block() {
        assert!(configmap_source(&source(None)).is_err());
    }

    #[test]
    fn test_validate_requires_name() {
        let src = source(Some(ConfigMapSource {
            name: String::new(),
            namespace: None,
            key: "registry.json".to_string(),
        }));
        assert!(configmap_source(&src).is_err());
    }

    #[test]
    fn test_validate_accepts_complete_source() {
        let src = source(Some(ConfigMapSource {
            name: "registry-data".to_string(),
            namespace: Some("toolhive-system".to_string()),
            key: "registry.json".to_string(),
        }));
        assert!(configmap_source(&src).is_ok());
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let mut src = source(Some(ConfigMapSource {
            name: "registry-data".to_string(),
            namespace: None,
            key: "registry.json".to_string(),
        }));
        src.source_type = SourceType::Url;
        src.url = Some(UrlSource {
            url: "https://example.com".to_string(),
            headers: None,
            tls_config: None,
            authentication: None,
        });
        let err = configmap_source(&src).unwrap_err();
        assert!(matches!(err, SourceError::ValidationFailed { .. }));
    }
}
