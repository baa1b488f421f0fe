//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Registry format detection, validation and conversion
//!
//! Two wire formats are recognized. The canonical (toolhive) format is a
//! single registry document keyed by server name. The upstream format maps
//! each server name to an envelope of `{server, packages, remotes}`. Both
//! directions of conversion are supported; toolhive-only fields travel in
//! the `x-publisher` extension so they survive a round trip.

use std::collections::BTreeMap;

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::types::{BaseServer, EnvVar, ImageServer, Registry, Transport};
use crate::CANONICAL_REGISTRY_VERSION;

/// Recognized registry wire formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistryFormat {
    #[default]
    Toolhive,
    Upstream,
}

impl std::fmt::Display for RegistryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegistryFormat::Toolhive => "toolhive",
            RegistryFormat::Upstream => "upstream",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RegistryFormat {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toolhive" => Ok(RegistryFormat::Toolhive),
            "upstream" => Ok(RegistryFormat::Upstream),
            other => Err(RegistryError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Result of a conversion, including how many entries could not be
/// represented in the target format
#[derive(Debug)]
pub struct ConversionOutcome {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

/// Upstream registry: a map of server name to envelope
pub type UpstreamRegistry = BTreeMap<String, UpstreamServerDetail>;

/// Envelope for one server in the upstream format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamServerDetail {
    pub server: UpstreamServer,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<UpstreamPackage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<UpstreamRemote>,

    /// Publisher extension carrying fields the upstream schema has no place for
    #[serde(default, rename = "x-publisher", skip_serializing_if = "Option::is_none")]
    pub publisher: Option<UpstreamPublisher>,
}

/// Server description in the upstream format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<UpstreamRepository>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_detail: Option<UpstreamVersionDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamRepository {
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamVersionDetail {
    pub version: String,
}

/// A distributable package for a server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamPackage {
    pub registry_name: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// A remote endpoint for a server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamRemote {
    pub transport_type: String,
    pub url: String,
}

/// Publisher-scoped extension data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamPublisher {
    #[serde(default, rename = "x-dev.toolhive", skip_serializing_if = "Option::is_none")]
    pub toolhive: Option<ToolhiveExtension>,
}

/// Toolhive-specific server fields carried through the upstream format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolhiveExtension {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Detect the format of a registry payload
///
/// Canonical wins when both `version` and `servers` are present; otherwise
/// the payload must be a non-empty map whose values all carry a nested
/// `server.name`.
pub fn detect_format(data: &[u8]) -> RegistryResult<RegistryFormat> {
    if data.is_empty() {
        return Err(RegistryError::invalid_data("cannot detect format of empty data"));
    }

    let value: serde_json::Value = serde_json::from_slice(data)
        .map_err(|e| RegistryError::invalid_data(format!("payload is not valid JSON: {}", e)))?;

    let object = match value.as_object() {
        Some(o) => o,
        None => return Err(RegistryError::UnknownFormat),
    };

    if object.get("version").map(|v| v.is_string()).unwrap_or(false)
        && object.get("servers").map(|v| v.is_object()).unwrap_or(false)
    {
        return Ok(RegistryFormat::Toolhive);
    }

    if !object.is_empty()
        && object.values().all(|entry| {
            entry
                .get("server")
                .and_then(|s| s.get("name"))
                .and_then(|n| n.as_str())
                .map(|n| !n.is_empty())
                .unwrap_or(false)
        })
    {
        return Ok(RegistryFormat::Upstream);
    }

    Err(RegistryError::UnknownFormat)
}

/// Validate a payload against a specific format
pub fn validate(data: &[u8], format: RegistryFormat) -> RegistryResult<()> {
    if data.is_empty() {
        return Err(RegistryError::invalid_data("data cannot be empty"));
    }

    match format {
        RegistryFormat::Toolhive => {
            let value: serde_json::Value = serde_json::from_slice(data)
                .map_err(|e| RegistryError::invalid_data(format!("invalid toolhive registry: {}", e)))?;
            let object = value
                .as_object()
                .ok_or_else(|| RegistryError::invalid_data("toolhive registry must be an object"))?;
            if !object
                .get("version")
                .and_then(|v| v.as_str())
                .map(|v| !v.is_empty())
                .unwrap_or(false)
            {
                return Err(RegistryError::invalid_data(
                    "toolhive registry missing required version field",
                ));
            }
            if !object.get("servers").map(|v| v.is_object()).unwrap_or(false) {
                return Err(RegistryError::invalid_data(
                    "toolhive registry missing servers field",
                ));
            }
            Registry::from_canonical_bytes(data).map(|_| ())
        }
        RegistryFormat::Upstream => {
            let upstream: UpstreamRegistry = serde_json::from_slice(data)
                .map_err(|e| RegistryError::invalid_data(format!("invalid upstream registry: {}", e)))?;
            if upstream.is_empty() {
                return Err(RegistryError::invalid_data("upstream registry contains no servers"));
            }
            for (name, detail) in &upstream {
                if name.is_empty() {
                    return Err(RegistryError::invalid_data(
                        "upstream registry contains server with empty name",
                    ));
                }
                if detail.server.name.is_empty() {
                    return Err(RegistryError::invalid_data(format!(
                        "upstream registry server '{}' missing server.name field",
                        name
                    )));
                }
            }
            Ok(())
        }
    }
}

/// Convert a registry payload between formats
///
/// Same-format conversion is the identity.
pub fn convert(data: &[u8], from: RegistryFormat, to: RegistryFormat) -> RegistryResult<Vec<u8>> {
    convert_with_outcome(data, from, to).map(|o| o.bytes)
}

/// Convert a registry payload, reporting entries the target cannot represent
pub fn convert_with_outcome(
    data: &[u8],
    from: RegistryFormat,
    to: RegistryFormat,
) -> RegistryResult<ConversionOutcome> {
    if data.is_empty() {
        return Err(RegistryError::invalid_data("data cannot be empty"));
    }

    if from == to {
        return Ok(ConversionOutcome {
            bytes: data.to_vec(),
            dropped: 0,
        });
    }

    match (from, to) {
        (RegistryFormat::Upstream, RegistryFormat::Toolhive) => {
            let (registry, dropped) = upstream_to_toolhive(data)?;
            Ok(ConversionOutcome {
                bytes: registry.to_canonical_bytes()?,
                dropped,
            })
        }
        (RegistryFormat::Toolhive, RegistryFormat::Upstream) => {
            let upstream = toolhive_to_upstream(data)?;
            Ok(ConversionOutcome {
                bytes: serde_json::to_vec(&upstream)?,
                dropped: 0,
            })
        }
        _ => Err(RegistryError::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Parse an upstream payload into a canonical registry
///
/// Envelopes with packages become image servers. Everything else, including
/// remote-only entries, cannot be represented and is dropped; the drop count
/// is returned alongside the registry.
pub fn upstream_to_toolhive(data: &[u8]) -> RegistryResult<(Registry, usize)> {
    let upstream: UpstreamRegistry = serde_json::from_slice(data)
        .map_err(|e| RegistryError::invalid_data(format!("invalid upstream registry: {}", e)))?;

    let mut registry = Registry {
        version: CANONICAL_REGISTRY_VERSION.to_string(),
        last_updated: Some(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        ..Default::default()
    };
    let mut dropped = 0;

    for (name, detail) in upstream {
        let extension = detail
            .publisher
            .as_ref()
            .and_then(|p| p.toolhive.clone())
            .unwrap_or_default();

        let base = |transport: Transport| BaseServer {
            name: name.clone(),
            description: detail.server.description.clone(),
            tier: extension.tier.clone(),
            status: detail.server.status.clone(),
            transport,
            tools: extension.tools.clone(),
            tags: extension.tags.clone(),
            repository_url: detail
                .server
                .repository
                .as_ref()
                .map(|r| r.url.clone())
                .unwrap_or_default(),
            metadata: extension.metadata.clone(),
        };

        if let Some(package) = detail.packages.first() {
            let transport = extension.transport.unwrap_or(Transport::Stdio);
            registry.servers.insert(
                name.clone(),
                ImageServer {
                    base: base(transport),
                    image: package_image(package),
                    command: extension.command.clone(),
                    args: extension.args.clone(),
                    environments: extension.environments.clone(),
                },
            );
        } else {
            dropped += 1;
        }
    }

    Ok((registry, dropped))
}

/// Wrap a canonical registry into the upstream envelope map
pub fn toolhive_to_upstream(data: &[u8]) -> RegistryResult<UpstreamRegistry> {
    let registry = Registry::from_canonical_bytes(data)?;
    let mut upstream = UpstreamRegistry::new();

    for (name, server) in &registry.servers {
        let mut detail = envelope_for(name, &server.base);
        detail.packages = vec![UpstreamPackage {
            registry_name: "docker".to_string(),
            name: server.image.clone(),
            version: String::new(),
        }];
        if let Some(publisher) = detail.publisher.as_mut() {
            if let Some(ext) = publisher.toolhive.as_mut() {
                ext.command = server.command.clone();
                ext.args = server.args.clone();
                ext.environments = server.environments.clone();
            }
        }
        upstream.insert(name.clone(), detail);
    }

    for (name, server) in &registry.remote_servers {
        let mut detail = envelope_for(name, &server.base);
        detail.remotes = vec![UpstreamRemote {
            transport_type: server.base.transport.to_string(),
            url: server.url.clone(),
        }];
        upstream.insert(name.clone(), detail);
    }

    Ok(upstream)
}

fn envelope_for(name: &str, base: &BaseServer) -> UpstreamServerDetail {
    UpstreamServerDetail {
        server: UpstreamServer {
            name: name.to_string(),
            description: base.description.clone(),
            status: base.status.clone(),
            repository: if base.repository_url.is_empty() {
                None
            } else {
                Some(UpstreamRepository {
                    url: base.repository_url.clone(),
                    source: String::new(),
                })
            },
            version_detail: None,
        },
        packages: Vec::new(),
        remotes: Vec::new(),
        publisher: Some(UpstreamPublisher {
            toolhive: Some(ToolhiveExtension {
                tier: base.tier.clone(),
                transport: Some(base.transport),
                tools: base.tools.clone(),
                tags: base.tags.clone(),
                metadata: base.metadata.clone(),
                ..Default::default()
            }),
        }),
    }
}

fn package_image(package: &UpstreamPackage) -> String {
    match package.registry_name.as_str() {
        "docker" | "oci" | "" => {
            if package.version.is_empty() || package.name.contains(':') {
                package.name.clone()
            } else {
                format!("{}:{}", package.name, package.version)
            }
        }
        other => format!("{}/{}", other, package.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLHIVE_DATA: &str = r#"{
        "version": "1.0.0",
        "lastUpdated": "2024-01-15T10:00:00Z",
        "servers": {
            "filesystem": {
                "description": "Filesystem operations server",
                "tier": "Official",
                "status": "Active",
                "transport": "stdio",
                "tags": ["filesystem", "production"],
                "image": "mcp/filesystem:latest"
            }
        },
        "remoteServers": {
            "api-gateway": {
                "description": "Remote API gateway",
                "transport": "sse",
                "tags": ["api"],
                "url": "https://api.example.com/mcp"
            }
        }
    }"#;

    const UPSTREAM_DATA: &str = r#"{
        "fetch": {
            "server": {
                "name": "fetch",
                "description": "Web content fetcher",
                "status": "active",
                "repository": {"url": "https://github.com/example/fetch", "source": "github"}
            },
            "packages": [{"registry_name": "docker", "name": "mcp/fetch", "version": "1.2.0"}]
        }
    }"#;

    #[test]
    fn test_detect_toolhive_format() {
        assert_eq!(
            detect_format(TOOLHIVE_DATA.as_bytes()).unwrap(),
            RegistryFormat::Toolhive
        );
    }

    #[test]
    fn test_detect_upstream_format() {
        assert_eq!(
            detect_format(UPSTREAM_DATA.as_bytes()).unwrap(),
            RegistryFormat::Upstream
        );
    }

    #[test]
    fn test_detect_unknown_format() {
        assert!(matches!(
            detect_format(br#"{"some": "object"}"#),
            Err(RegistryError::UnknownFormat)
        ));
        assert!(matches!(
            detect_format(br#"[1, 2, 3]"#),
            Err(RegistryError::UnknownFormat)
        ));
        assert!(detect_format(b"").is_err());
    }

    #[test]
    fn test_validate_toolhive() {
        assert!(validate(TOOLHIVE_DATA.as_bytes(), RegistryFormat::Toolhive).is_ok());

        let missing_version = br#"{"servers": {}}"#;
        assert!(validate(missing_version, RegistryFormat::Toolhive).is_err());

        let missing_servers = br#"{"version": "1.0.0"}"#;
        assert!(validate(missing_servers, RegistryFormat::Toolhive).is_err());
    }

    #[test]
    fn test_validate_format_mismatch() {
        // Upstream bytes declared as toolhive must be rejected, not stored.
        let err = validate(UPSTREAM_DATA.as_bytes(), RegistryFormat::Toolhive).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidData { .. }));

        let err = validate(TOOLHIVE_DATA.as_bytes(), RegistryFormat::Upstream).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidData { .. }));
    }

    #[test]
    fn test_validate_upstream_empty() {
        assert!(validate(b"{}", RegistryFormat::Upstream).is_err());
    }

    #[test]
    fn test_convert_same_format_is_identity() {
        let result = convert(
            TOOLHIVE_DATA.as_bytes(),
            RegistryFormat::Toolhive,
            RegistryFormat::Toolhive,
        )
        .unwrap();
        assert_eq!(result, TOOLHIVE_DATA.as_bytes());
    }

    #[test]
    fn test_convert_empty_data() {
        assert!(convert(b"", RegistryFormat::Upstream, RegistryFormat::Toolhive).is_err());
    }

    #[test]
    fn test_upstream_to_toolhive_synthesizes_metadata() {
        let (registry, dropped) = upstream_to_toolhive(UPSTREAM_DATA.as_bytes()).unwrap();
        assert_eq!(registry.version, CANONICAL_REGISTRY_VERSION);
        assert!(registry.last_updated.is_some());
        assert_eq!(dropped, 0);

        let fetch = &registry.servers["fetch"];
        assert_eq!(fetch.image, "mcp/fetch:1.2.0");
        assert_eq!(fetch.base.description, "Web content fetcher");
        assert_eq!(fetch.base.repository_url, "https://github.com/example/fetch");
    }

    #[test]
    fn test_upstream_entry_without_packages_or_remotes_dropped() {
        let data = r#"{
            "ghost": {"server": {"name": "ghost", "description": "nothing to run"}}
        }"#;
        let (registry, dropped) = upstream_to_toolhive(data.as_bytes()).unwrap();
        assert_eq!(registry.server_count(), 0);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_remote_only_upstream_entry_dropped() {
        let data = r#"{
            "gateway": {
                "server": {"name": "gateway", "description": "Remote gateway"},
                "remotes": [{"transport_type": "sse", "url": "https://gw.example.com/mcp"}]
            }
        }"#;
        let (registry, dropped) = upstream_to_toolhive(data.as_bytes()).unwrap();
        assert_eq!(registry.server_count(), 0);
        assert!(registry.remote_servers.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_round_trip_preserves_image_servers() {
        // toolhive -> upstream -> toolhive keeps names and the
        // description/transport/tags/image tuple for every image server.
        // Remote servers have no package representation, so converting back
        // drops them with a recorded count.
        let upstream_bytes = convert(
            TOOLHIVE_DATA.as_bytes(),
            RegistryFormat::Toolhive,
            RegistryFormat::Upstream,
        )
        .unwrap();
        let outcome = convert_with_outcome(
            &upstream_bytes,
            RegistryFormat::Upstream,
            RegistryFormat::Toolhive,
        )
        .unwrap();

        let original = Registry::from_canonical_bytes(TOOLHIVE_DATA.as_bytes()).unwrap();
        let round_tripped = Registry::from_canonical_bytes(&outcome.bytes).unwrap();

        assert_eq!(
            original.servers.keys().collect::<Vec<_>>(),
            round_tripped.servers.keys().collect::<Vec<_>>()
        );

        let fs = &original.servers["filesystem"];
        let fs2 = &round_tripped.servers["filesystem"];
        assert_eq!(fs.base.description, fs2.base.description);
        assert_eq!(fs.base.transport, fs2.base.transport);
        assert_eq!(fs.base.tags, fs2.base.tags);
        assert_eq!(fs.image, fs2.image);

        assert!(round_tripped.remote_servers.is_empty());
        assert_eq!(outcome.dropped, original.remote_servers.len());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("toolhive".parse::<RegistryFormat>().unwrap(), RegistryFormat::Toolhive);
        assert_eq!("upstream".parse::<RegistryFormat>().unwrap(), RegistryFormat::Upstream);
        assert!("jsonl".parse::<RegistryFormat>().is_err());
    }
}
