//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Registry source handlers
//!
//! A source handler turns a source reference into a canonical registry. One
//! handler exists per source type, all behind the same narrow interface:
//! validate the configuration, fetch and normalize the data, and compute the
//! current content hash for change detection.

pub mod configmap;
pub mod git;
pub mod url;

use async_trait::async_trait;
use kube::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;

use registry_core::conversion::{self, RegistryFormat};
use registry_core::v1alpha1::{MCPRegistry, MCPRegistrySource, SourceType};
use registry_core::{Registry, RegistryError};

pub use configmap::ConfigMapSourceHandler;
pub use git::GitSourceHandler;
pub use url::{ExternalRegistrySourceHandler, UrlSourceHandler};

/// Result of a successful fetch
#[derive(Debug)]
pub struct FetchResult {
    /// Parsed canonical registry
    pub registry: Registry,

    /// Canonical serialization of the registry
    ///
    /// When the source payload is already canonical these are the raw source
    /// bytes, so the stored artifact hashes to the sync hash.
    pub bytes: Vec<u8>,

    /// Hex-encoded SHA-256 of the raw source payload
    pub hash: String,

    /// Number of servers before filtering
    pub server_count: u32,

    /// Format the source payload was in
    pub format: RegistryFormat,
}

/// Errors surfaced by source handlers
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source configuration is malformed
    #[error("{source_type} source validation failed: {message}")]
    ValidationFailed {
        source_type: SourceType,
        message: String,
    },

    /// Referenced resource does not exist
    #[error("Source not found: {message}")]
    SourceNotFound { message: String },

    /// Payload is not valid registry data
    #[error("Invalid registry data: {message}")]
    InvalidData { message: String },

    /// Transport or cluster I/O failure during fetch
    #[error("Fetch failed: {message}")]
    FetchFailed { message: String },

    /// Source type has no working transport
    #[error("Unsupported source: {message}")]
    UnsupportedSource { message: String },
}

impl SourceError {
    pub fn validation(source_type: SourceType, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            source_type,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::SourceNotFound {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::FetchFailed {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            message: message.into(),
        }
    }
}

impl From<RegistryError> for SourceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownFormat
            | RegistryError::InvalidData { .. }
            | RegistryError::Validation { .. }
            | RegistryError::Serialization { .. } => Self::invalid_data(err.to_string()),
            RegistryError::UnsupportedFormat { .. }
            | RegistryError::UnsupportedConversion { .. } => Self::invalid_data(err.to_string()),
            other => Self::fetch(other.to_string()),
        }
    }
}

/// Handler interface implemented per source type
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Validate the source configuration for this handler's type
    fn validate(&self, source: &MCPRegistrySource) -> Result<(), SourceError>;

    /// Fetch the source payload and normalize it into a canonical registry
    async fn fetch_registry(&self, registry: &MCPRegistry) -> Result<FetchResult, SourceError>;

    /// Hash of the current source payload, for change detection without a
    /// full sync
    async fn current_hash(&self, registry: &MCPRegistry) -> Result<String, SourceError>;
}

/// Create the handler for a source type
pub fn create_handler(
    client: Client,
    source_type: SourceType,
) -> Result<Box<dyn SourceHandler>, SourceError> {
    match source_type {
        SourceType::Configmap => Ok(Box::new(ConfigMapSourceHandler::new(client))),
        SourceType::Url => Ok(Box::new(UrlSourceHandler::new(client))),
        SourceType::Registry => Ok(Box::new(ExternalRegistrySourceHandler::new(client))),
        SourceType::Git => Ok(Box::new(GitSourceHandler::new())),
    }
}

/// Hex-encoded SHA-256 of a payload
pub fn payload_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Normalize a raw source payload into a canonical registry
///
/// The payload's detected format must match the declared source format; a
/// mismatch is invalid data rather than a silent conversion.
pub fn process_payload(
    data: &[u8],
    declared: RegistryFormat,
) -> Result<FetchResult, SourceError> {
    let detected = conversion::detect_format(data)?;
    if detected != declared {
        return Err(SourceError::invalid_data(format!(
            "source declares {} format but payload is {}",
            declared, detected
        )));
    }

    conversion::validate(data, declared)?;

    let (registry, bytes) = match declared {
        RegistryFormat::Toolhive => {
            let registry = Registry::from_canonical_bytes(data)?;
            (registry, data.to_vec())
        }
        RegistryFormat::Upstream => {
            let (registry, dropped) = conversion::upstream_to_toolhive(data)?;
            if dropped > 0 {
                tracing::info!(
                    dropped,
                    "Dropped upstream entries that cannot be represented as image servers"
                );
            }
            registry.validate()?;
            let bytes = registry.to_canonical_bytes()?;
            (registry, bytes)
        }
    };

    let server_count = registry.server_count() as u32;
    Ok(FetchResult {
        registry,
        bytes,
        hash: payload_hash(data),
        server_count,
        format: declared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLHIVE_DATA: &str = r#"{
        "version": "1.0.0",
        "servers": {
            "filesystem": {
                "description": "Filesystem operations server",
                "transport": "stdio",
                "image": "mcp/filesystem:latest"
            }
        }
    }"#;

    #[test]
    fn test_payload_hash_is_hex_sha256() {
        let hash = payload_hash(b"hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_process_canonical_payload_keeps_raw_bytes() {
        let result = process_payload(TOOLHIVE_DATA.as_bytes(), RegistryFormat::Toolhive).unwrap();
        assert_eq!(result.bytes, TOOLHIVE_DATA.as_bytes());
        assert_eq!(result.server_count, 1);
        assert_eq!(result.format, RegistryFormat::Toolhive);
        assert_eq!(result.hash, payload_hash(TOOLHIVE_DATA.as_bytes()));
    }

    #[test]
    fn test_process_payload_rejects_format_mismatch() {
        // Upstream bytes declared as toolhive surface invalid data, so the
        // sync fails without touching storage.
        let upstream = r#"{
            "fetch": {
                "server": {"name": "fetch", "description": "d"},
                "packages": [{"registry_name": "docker", "name": "mcp/fetch"}]
            }
        }"#;
        let err = process_payload(upstream.as_bytes(), RegistryFormat::Toolhive).unwrap_err();
        assert!(matches!(err, SourceError::InvalidData { .. }));
    }

    #[test]
    fn test_process_upstream_payload_normalizes() {
        let upstream = r#"{
            "fetch": {
                "server": {"name": "fetch", "description": "Web fetcher"},
                "packages": [{"registry_name": "docker", "name": "mcp/fetch", "version": "1.0.0"}]
            }
        }"#;
        let result = process_payload(upstream.as_bytes(), RegistryFormat::Upstream).unwrap();
        assert_eq!(result.format, RegistryFormat::Upstream);
        assert_eq!(result.server_count, 1);
        assert!(result.registry.servers.contains_key("fetch"));
        // Canonical bytes reparse to the same registry
        let reparsed = Registry::from_canonical_bytes(&result.bytes).unwrap();
        assert_eq!(reparsed, result.registry);
    }

    #[test]
    fn test_process_payload_rejects_garbage() {
        let err = process_payload(b"not json at all", RegistryFormat::Toolhive).unwrap_err();
        assert!(matches!(err, SourceError::InvalidData { .. }));
    }
}
