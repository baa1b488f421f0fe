//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! HTTP(S) source handlers
//!
//! Covers both the plain `url` source and the external `registry` source.
//! Credentials are never inlined in the resource; they are resolved from
//! Secret references at fetch time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use registry_core::v1alpha1::{
    HttpAuth, MCPRegistry, MCPRegistrySource, SecretKeyRef, SourceType, TlsConfig,
};

use super::{payload_hash, process_payload, FetchResult, SourceError, SourceHandler};

/// Fetches registry data from an HTTP(S) endpoint
pub struct UrlSourceHandler {
    client: Client,
}

/// Fetches registry data from an external MCP registry
pub struct ExternalRegistrySourceHandler {
    client: Client,
}

impl UrlSourceHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn read_payload(&self, registry: &MCPRegistry) -> Result<Vec<u8>, SourceError> {
        let source = url_source(&registry.spec.source)?;
        fetch_url(
            &self.client,
            registry.namespace(),
            &source.url,
            source.headers.as_ref(),
            source.tls_config.as_ref(),
            source.authentication.as_ref(),
        )
        .await
    }
}

#[async_trait]
impl SourceHandler for UrlSourceHandler {
    fn validate(&self, source: &MCPRegistrySource) -> Result<(), SourceError> {
        url_source(source).map(|_| ())
    }

    async fn fetch_registry(&self, registry: &MCPRegistry) -> Result<FetchResult, SourceError> {
        let payload = self.read_payload(registry).await?;
        let result = process_payload(&payload, registry.spec.source.effective_format())?;

        info!(
            registry = %registry.name_any(),
            servers = result.server_count,
            format = %result.format,
            hash = %&result.hash[..8],
            "Fetched registry data from URL source"
        );

        Ok(result)
    }

    async fn current_hash(&self, registry: &MCPRegistry) -> Result<String, SourceError> {
        let payload = self.read_payload(registry).await?;
        Ok(payload_hash(&payload))
    }
}

impl ExternalRegistrySourceHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn read_payload(&self, registry: &MCPRegistry) -> Result<Vec<u8>, SourceError> {
        let source = registry_source(&registry.spec.source)?;
        fetch_url(
            &self.client,
            registry.namespace(),
            &source.url,
            None,
            None,
            source.authentication.as_ref(),
        )
        .await
    }
}

#[async_trait]
impl SourceHandler for ExternalRegistrySourceHandler {
    fn validate(&self, source: &MCPRegistrySource) -> Result<(), SourceError> {
        registry_source(source).map(|_| ())
    }

    async fn fetch_registry(&self, registry: &MCPRegistry) -> Result<FetchResult, SourceError> {
        let payload = self.read_payload(registry).await?;
        let result = process_payload(&payload, registry.spec.source.effective_format())?;

        info!(
            registry = %registry.name_any(),
            servers = result.server_count,
            format = %result.format,
            "Fetched registry data from external registry source"
        );

        Ok(result)
    }

    async fn current_hash(&self, registry: &MCPRegistry) -> Result<String, SourceError> {
        let payload = self.read_payload(registry).await?;
        Ok(payload_hash(&payload))
    }
}

fn url_source(
    source: &MCPRegistrySource,
) -> Result<&registry_core::v1alpha1::UrlSource, SourceError> {
    if source.source_type != SourceType::Url {
        return Err(SourceError::validation(
            SourceType::Url,
            format!("source type mismatch: got {}", source.source_type),
        ));
    }
    let url_source = source
        .url
        .as_ref()
        .ok_or_else(|| SourceError::validation(SourceType::Url, "url configuration is required"))?;
    validate_http_url(SourceType::Url, &url_source.url)?;
    Ok(url_source)
}

fn registry_source(
    source: &MCPRegistrySource,
) -> Result<&registry_core::v1alpha1::RegistrySource, SourceError> {
    if source.source_type != SourceType::Registry {
        return Err(SourceError::validation(
            SourceType::Registry,
            format!("source type mismatch: got {}", source.source_type),
        ));
    }
    let registry_source = source.registry.as_ref().ok_or_else(|| {
        SourceError::validation(SourceType::Registry, "registry configuration is required")
    })?;
    validate_http_url(SourceType::Registry, &registry_source.url)?;
    Ok(registry_source)
}

fn validate_http_url(source_type: SourceType, url: &str) -> Result<(), SourceError> {
    if url.is_empty() {
        return Err(SourceError::validation(source_type, "url is required"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(SourceError::validation(
            source_type,
            format!("url must use http or https: {}", url),
        ));
    }
    Ok(())
}

/// Perform an authenticated GET and return the response body
async fn fetch_url(
    kube_client: &Client,
    default_namespace: Option<String>,
    url: &str,
    headers: Option<&BTreeMap<String, String>>,
    tls: Option<&TlsConfig>,
    auth: Option<&HttpAuth>,
) -> Result<Vec<u8>, SourceError> {
    debug!(url = %url, "Fetching registry data over HTTP");

    let mut builder = reqwest::Client::builder();
    if let Some(tls) = tls {
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(bundle) = &tls.ca_bundle {
            let cert = reqwest::Certificate::from_pem(bundle.as_bytes())
                .map_err(|e| SourceError::validation(SourceType::Url, format!("invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
    }
    let http = builder
        .build()
        .map_err(|e| SourceError::fetch(format!("failed to build HTTP client: {}", e)))?;

    let mut request = http.get(url);
    if let Some(headers) = headers {
        for (name, value) in headers {
            request = request.header(name, value);
        }
    }

    if let Some(auth) = auth {
        if let Some(token_ref) = &auth.bearer_token {
            let token = resolve_secret(kube_client, default_namespace.as_deref(), token_ref).await?;
            request = request.bearer_auth(token);
        } else if let Some(basic) = &auth.basic {
            let password =
                resolve_secret(kube_client, default_namespace.as_deref(), &basic.password_ref)
                    .await?;
            request = request.basic_auth(&basic.username, Some(password));
        }
    }

    let response = request
        .send()
        .await
        .map_err(|e| SourceError::fetch(format!("request to '{}' failed: {}", url, e)))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SourceError::not_found(format!(
            "'{}' returned 404 Not Found",
            url
        )));
    }
    if !status.is_success() {
        return Err(SourceError::fetch(format!(
            "'{}' returned status {}",
            url, status
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::fetch(format!("failed to read response body: {}", e)))?;
    Ok(body.to_vec())
}

/// Resolve a credential from a Secret reference
async fn resolve_secret(
    client: &Client,
    default_namespace: Option<&str>,
    secret_ref: &SecretKeyRef,
) -> Result<String, SourceError> {
    let namespace = secret_ref
        .namespace
        .as_deref()
        .or(default_namespace)
        .ok_or_else(|| {
            SourceError::validation(SourceType::Url, "secret reference has no namespace")
        })?;

    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = match api.get(&secret_ref.name).await {
        Ok(s) => s,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Err(SourceError::not_found(format!(
                "Secret '{}' not found in namespace '{}'",
                secret_ref.name, namespace
            )));
        }
        Err(e) => {
            return Err(SourceError::fetch(format!(
                "failed to fetch Secret '{}': {}",
                secret_ref.name, e
            )));
        }
    };

    let value = secret
        .data
        .as_ref()
        .and_then(|d| d.get(&secret_ref.key))
        .ok_or_else(|| {
            SourceError::not_found(format!(
                "key '{}' not found in Secret '{}'",
                secret_ref.key, secret_ref.name
            ))
        })?;

    String::from_utf8(value.0.clone()).map_err(|_| {
        SourceError::invalid_data(format!(
            "Secret '{}' key '{}' is not valid UTF-8",
            secret_ref.name, secret_ref.key
        ))
    })
}
