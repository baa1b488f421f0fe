//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Canonical registry data model
//!
//! The canonical (toolhive) registry format is a single JSON object keyed by
//! server name. Container-image backed servers live under `servers`, remote
//! endpoints under `remoteServers`. Map ordering is deterministic so that
//! serializing the same registry always produces identical bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Transport protocols supported by MCP servers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[default]
    Stdio,
    Sse,
    Http,
    StreamableHttp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Transport::Stdio => "stdio",
            Transport::Sse => "sse",
            Transport::Http => "http",
            Transport::StreamableHttp => "streamable-http",
        };
        write!(f, "{}", s)
    }
}

/// Canonical registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Registry schema version
    pub version: String,

    /// Advisory timestamp of the last registry update (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    /// Container-image backed servers, keyed by server name
    #[serde(default)]
    pub servers: BTreeMap<String, ImageServer>,

    /// Remote servers, keyed by server name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remote_servers: BTreeMap<String, RemoteServer>,

    /// Named server groupings, passed through opaquely
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

/// Fields shared by image and remote servers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseServer {
    /// Server name; must equal the map key when present
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Support tier, e.g. "Official" or "Community"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tier: String,

    /// Lifecycle status, e.g. "Active" or "Deprecated"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    /// Transport protocol
    pub transport: Transport,

    /// Tool names exposed by the server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    /// Classification tags; compared case-sensitively by the filter engine
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Source repository URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository_url: String,

    /// Opaque metadata, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A server backed by a container image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageServer {
    #[serde(flatten)]
    pub base: BaseServer,

    /// Container image reference
    pub image: String,

    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Additional arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables understood by the server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvVar>,
}

/// A server reached at a remote endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteServer {
    #[serde(flatten)]
    pub base: BaseServer,

    /// Remote endpoint URL
    pub url: String,
}

/// An environment variable declaration for an image server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A named grouping of servers
///
/// Groups are carried through sync and filtering untouched; unknown fields
/// are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Registry {
    /// Total number of servers across both maps
    pub fn server_count(&self) -> usize {
        self.servers.len() + self.remote_servers.len()
    }

    /// Serialize to canonical JSON bytes
    ///
    /// Maps are ordered, so the same registry always serializes to the same
    /// bytes.
    pub fn to_canonical_bytes(&self) -> RegistryResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate canonical JSON bytes
    pub fn from_canonical_bytes(data: &[u8]) -> RegistryResult<Self> {
        let registry: Registry = serde_json::from_slice(data)
            .map_err(|e| RegistryError::invalid_data(format!("invalid toolhive registry: {}", e)))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Validate the registry against the model invariants
    pub fn validate(&self) -> RegistryResult<()> {
        if self.version.is_empty() {
            return Err(RegistryError::validation("registry version is required"));
        }

        for (key, server) in &self.servers {
            Self::validate_base(key, &server.base)?;
            if server.image.is_empty() {
                return Err(RegistryError::validation(format!(
                    "server '{}': image is required",
                    key
                )));
            }
        }

        for (key, server) in &self.remote_servers {
            Self::validate_base(key, &server.base)?;
            if server.url.is_empty() {
                return Err(RegistryError::validation(format!(
                    "remote server '{}': url is required",
                    key
                )));
            }
            if self.servers.contains_key(key) {
                return Err(RegistryError::validation(format!(
                    "server name '{}' appears in both servers and remoteServers",
                    key
                )));
            }
        }

        Ok(())
    }

    fn validate_base(key: &str, base: &BaseServer) -> RegistryResult<()> {
        if !base.name.is_empty() && base.name != key {
            return Err(RegistryError::validation(format!(
                "server '{}': name field '{}' does not match map key",
                key, base.name
            )));
        }
        if base.description.is_empty() {
            return Err(RegistryError::validation(format!(
                "server '{}': description is required",
                key
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_server(name: &str, tags: &[&str]) -> ImageServer {
        ImageServer {
            base: BaseServer {
                name: name.to_string(),
                description: format!("{} server", name),
                transport: Transport::Stdio,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            image: format!("mcp/{}:latest", name),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_servers_map_is_valid() {
        let registry = Registry {
            version: "1.0.0".to_string(),
            ..Default::default()
        };
        assert!(registry.validate().is_ok());
        assert_eq!(registry.server_count(), 0);
    }

    #[test]
    fn test_missing_version_rejected() {
        let registry = Registry::default();
        assert!(matches!(
            registry.validate(),
            Err(RegistryError::Validation { .. })
        ));
    }

    #[test]
    fn test_name_must_match_map_key() {
        let mut registry = Registry {
            version: "1.0.0".to_string(),
            ..Default::default()
        };
        registry
            .servers
            .insert("filesystem".to_string(), image_server("other-name", &[]));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_duplicate_names_across_maps_rejected() {
        let mut registry = Registry {
            version: "1.0.0".to_string(),
            ..Default::default()
        };
        registry
            .servers
            .insert("shared".to_string(), image_server("shared", &[]));
        registry.remote_servers.insert(
            "shared".to_string(),
            RemoteServer {
                base: BaseServer {
                    name: "shared".to_string(),
                    description: "remote".to_string(),
                    transport: Transport::Sse,
                    ..Default::default()
                },
                url: "https://example.com/mcp".to_string(),
            },
        );
        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("both servers and remoteServers"));
    }

    #[test]
    fn test_unknown_transport_fails_parse() {
        let data = r#"{
            "version": "1.0.0",
            "servers": {
                "bad": {"description": "d", "transport": "carrier-pigeon", "image": "img"}
            }
        }"#;
        assert!(Registry::from_canonical_bytes(data.as_bytes()).is_err());
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let mut registry = Registry {
            version: "1.0.0".to_string(),
            ..Default::default()
        };
        registry
            .servers
            .insert("zeta".to_string(), image_server("zeta", &["a"]));
        registry
            .servers
            .insert("alpha".to_string(), image_server("alpha", &["b"]));

        let first = registry.to_canonical_bytes().unwrap();
        let second = registry.to_canonical_bytes().unwrap();
        assert_eq!(first, second);

        let reparsed = Registry::from_canonical_bytes(&first).unwrap();
        assert_eq!(reparsed, registry);
    }

    #[test]
    fn test_group_extra_fields_preserved() {
        let data = r#"{
            "version": "1.0.0",
            "servers": {},
            "groups": [{"name": "prod", "description": "d", "members": ["a", "b"]}]
        }"#;
        let registry = Registry::from_canonical_bytes(data.as_bytes()).unwrap();
        assert_eq!(registry.groups.len(), 1);
        assert!(registry.groups[0].extra.contains_key("members"));

        let bytes = registry.to_canonical_bytes().unwrap();
        let reparsed = Registry::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(reparsed.groups, registry.groups);
    }
}
