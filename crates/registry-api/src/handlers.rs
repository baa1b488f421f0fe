//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Request handlers for the registry API
//!
//! All registry data is served from the stored canonical bytes; conversion
//! to the upstream format happens lazily per request.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use registry_core::conversion::{self, RegistryFormat};
use registry_core::v1alpha1::MCPRegistry;
use kube::ResourceExt;

use crate::error::{ApiError, ApiResult};
use crate::provider::RegistryDataProvider;
use crate::responses::{
    RegistryInfo, RegistrySourceInfo, RegistryStatusInfo, ServerListResponse, ServerResponse,
};

/// Embedded OpenAPI document
const OPENAPI_SPEC: &str = include_str!("../openapi.yaml");

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn RegistryDataProvider>,
}

/// Format query parameter
#[derive(Debug, Deserialize)]
pub struct FormatQuery {
    format: Option<String>,
}

impl FormatQuery {
    /// Requested format, defaulting to toolhive
    fn resolve(&self) -> ApiResult<RegistryFormat> {
        match self.format.as_deref() {
            None | Some("") => Ok(RegistryFormat::Toolhive),
            Some(value) => value.parse().map_err(|_| {
                ApiError::BadRequest(format!(
                    "Unsupported format: {}. Supported formats: toolhive, upstream",
                    value
                ))
            }),
        }
    }
}

/// GET /health
///
/// Liveness only; never consults storage.
pub async fn health() -> &'static str {
    "OK"
}

/// GET /readiness
///
/// Ready once the declaration is retrievable and data has been synced.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.provider.registry().await {
        Ok(registry)
            if registry
                .status
                .as_ref()
                .and_then(|s| s.storage_ref.as_ref())
                .is_some() =>
        {
            (StatusCode::OK, "Ready")
        }
        Ok(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Not ready: registry has no synced data",
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Not ready: cannot access registry",
        ),
    }
}

/// GET /openapi.yaml
pub async fn openapi() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        OPENAPI_SPEC,
    )
}

/// GET /api/v1/registry/info
pub async fn registry_info(State(state): State<AppState>) -> ApiResult<Json<RegistryInfo>> {
    let registry = state.provider.registry().await?;
    Ok(Json(build_registry_info(&registry)))
}

/// GET /api/v1/registry/servers
pub async fn list_servers(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
) -> ApiResult<Json<ServerListResponse>> {
    let format = query.resolve()?;
    let data = state.provider.registry_data().await?;
    let servers = servers_in_format(&data, format)?;

    debug!(count = servers.len(), format = %format, "Serving server list");

    Ok(Json(ServerListResponse {
        count: servers.len(),
        servers,
        format: format.to_string(),
    }))
}

/// GET /api/v1/registry/servers/{name}
pub async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<FormatQuery>,
) -> ApiResult<Json<ServerResponse>> {
    let format = query.resolve()?;
    let data = state.provider.registry_data().await?;
    let mut servers = servers_in_format(&data, format)?;

    let server = servers
        .remove(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Server '{}' not found", name)))?;

    Ok(Json(ServerResponse {
        name,
        server,
        format: format.to_string(),
    }))
}

/// Build the info response from the declaration
fn build_registry_info(registry: &MCPRegistry) -> RegistryInfo {
    let format = registry.spec.source.effective_format().to_string();

    let status = registry.status.as_ref().and_then(|status| {
        status.phase.map(|phase| RegistryStatusInfo {
            phase: phase.to_string(),
            server_count: status.server_count,
            last_sync_time: status.last_sync_time.clone(),
            last_sync_hash: if status.last_sync_hash.is_empty() {
                None
            } else {
                Some(status.last_sync_hash.clone())
            },
            message: if status.message.is_empty() {
                None
            } else {
                Some(status.message.clone())
            },
        })
    });

    RegistryInfo {
        name: registry.name_any(),
        display_name: registry.spec.display_name.clone(),
        format: format.clone(),
        source: RegistrySourceInfo {
            source_type: registry.spec.source.source_type.to_string(),
            format,
        },
        status,
        sync_policy: registry.spec.sync_policy.clone(),
    }
}

/// Extract the server map from canonical bytes in the requested format
///
/// For the toolhive format both server maps are merged; for the upstream
/// format every entry is an envelope.
fn servers_in_format(
    data: &[u8],
    format: RegistryFormat,
) -> ApiResult<BTreeMap<String, serde_json::Value>> {
    match format {
        RegistryFormat::Toolhive => {
            let value: serde_json::Value = serde_json::from_slice(data)
                .map_err(|e| ApiError::Internal(format!("stored registry data is invalid: {}", e)))?;

            let mut servers = BTreeMap::new();
            for key in ["servers", "remoteServers"] {
                if let Some(map) = value.get(key).and_then(|v| v.as_object()) {
                    for (name, server) in map {
                        servers.insert(name.clone(), server.clone());
                    }
                }
            }
            Ok(servers)
        }
        RegistryFormat::Upstream => {
            let upstream = conversion::toolhive_to_upstream(data)?;
            upstream
                .into_iter()
                .map(|(name, detail)| {
                    serde_json::to_value(detail)
                        .map(|value| (name, value))
                        .map_err(|e| ApiError::Internal(e.to_string()))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::responses::ErrorResponse;
    use crate::server;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use registry_core::v1alpha1::{
        ConfigMapReference, ConfigMapSource, MCPRegistryPhase, MCPRegistrySource,
        MCPRegistrySpec, MCPRegistryStatus, SourceType, StorageReference,
    };
    use tower::ServiceExt;

    const STORED_DATA: &str = r#"{
        "version": "1.0.0",
        "servers": {
            "filesystem": {
                "description": "Filesystem operations server",
                "transport": "stdio",
                "tags": ["production"],
                "image": "mcp/filesystem:latest"
            }
        }
    }"#;

    /// In-memory provider for handler tests
    struct MemoryProvider {
        registry: MCPRegistry,
        data: Option<Vec<u8>>,
    }

    #[async_trait]
    impl RegistryDataProvider for MemoryProvider {
        async fn registry(&self) -> Result<MCPRegistry, ProviderError> {
            Ok(self.registry.clone())
        }

        async fn registry_data(&self) -> Result<Vec<u8>, ProviderError> {
            self.data
                .clone()
                .ok_or_else(|| ProviderError::StorageNotFound("no data".to_string()))
        }
    }

    fn test_registry(synced: bool) -> MCPRegistry {
        let spec = MCPRegistrySpec {
            display_name: Some("Production Registry".to_string()),
            source: MCPRegistrySource {
                source_type: SourceType::Configmap,
                format: None,
                configmap: Some(ConfigMapSource {
                    name: "registry-data".to_string(),
                    namespace: None,
                    key: "registry.json".to_string(),
                }),
                url: None,
                git: None,
                registry: None,
            },
            sync_policy: None,
            filter: None,
        };
        let mut registry = MCPRegistry::new("production", spec);
        registry.metadata.namespace = Some("toolhive-system".to_string());
        if synced {
            registry.status = Some(MCPRegistryStatus {
                phase: Some(MCPRegistryPhase::Ready),
                message: "Registry is ready and synchronized".to_string(),
                server_count: 1,
                last_sync_hash: "abc123".to_string(),
                storage_ref: Some(StorageReference {
                    storage_type: "configmap".to_string(),
                    config_map_ref: Some(ConfigMapReference {
                        name: "production-registry-storage".to_string(),
                        namespace: "toolhive-system".to_string(),
                        key: "registry.json".to_string(),
                    }),
                }),
                ..Default::default()
            });
        }
        registry
    }

    fn app(synced: bool, data: Option<&str>) -> axum::Router {
        let provider = Arc::new(MemoryProvider {
            registry: test_registry(synced),
            data: data.map(|d| d.as_bytes().to_vec()),
        });
        server::app(AppState { provider })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_never_consults_storage() {
        let app = app(false, None);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_readiness_requires_storage_ref() {
        let app = app(false, None);
        let response = app
            .oneshot(Request::get("/readiness").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readiness_ok_when_synced() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(Request::get("/readiness").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_openapi_served_as_yaml() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(Request::get("/openapi.yaml").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/yaml"
        );
    }

    #[tokio::test]
    async fn test_registry_info() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/info")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info = body_json(response).await;
        assert_eq!(info["name"], "production");
        assert_eq!(info["displayName"], "Production Registry");
        assert_eq!(info["format"], "toolhive");
        assert_eq!(info["source"]["type"], "configmap");
        assert_eq!(info["status"]["phase"], "Ready");
        assert_eq!(info["status"]["serverCount"], 1);
    }

    #[tokio::test]
    async fn test_list_servers_defaults_to_toolhive() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let list = body_json(response).await;
        assert_eq!(list["count"], 1);
        assert_eq!(list["format"], "toolhive");
        assert_eq!(
            list["servers"]["filesystem"]["description"],
            "Filesystem operations server"
        );
    }

    #[tokio::test]
    async fn test_list_servers_converts_to_upstream_on_demand() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers?format=upstream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let list = body_json(response).await;
        assert_eq!(list["format"], "upstream");
        assert_eq!(list["servers"]["filesystem"]["server"]["name"], "filesystem");
    }

    #[tokio::test]
    async fn test_unsupported_format_is_rejected() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers?format=jsonl")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.code, 400);
        assert_eq!(error.error, "Bad Request");
        assert!(error.message.contains("jsonl"));
    }

    #[tokio::test]
    async fn test_get_server_by_name() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers/filesystem")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let server = body_json(response).await;
        assert_eq!(server["name"], "filesystem");
        assert_eq!(server["server"]["image"], "mcp/filesystem:latest");
    }

    #[tokio::test]
    async fn test_get_missing_server_is_404() {
        let app = app(true, Some(STORED_DATA));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["code"], 404);
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn test_missing_storage_is_internal_error() {
        let app = app(true, None);
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_empty_servers_map_is_valid() {
        let empty = r#"{"version": "1.0.0", "servers": {}}"#;
        let app = app(true, Some(empty));
        let response = app
            .oneshot(
                Request::get("/api/v1/registry/servers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let list = body_json(response).await;
        assert_eq!(list["count"], 0);
    }
}
