//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! MCPRegistry custom resource types
//!
//! The MCPRegistry resource declares a desired registry: where to fetch the
//! data from, how to keep it in sync, and which servers to keep. All
//! reconciliation memory (hashes, attempt counters, retry times, the last
//! manual trigger) lives in the status subresource.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conversion::RegistryFormat;
use crate::duration::parse_duration;
use crate::error::RegistryResult;
use crate::SYNC_TRIGGER_ANNOTATION;

/// Condition types reported on MCPRegistry status
pub const CONDITION_SOURCE_AVAILABLE: &str = "SourceAvailable";
pub const CONDITION_DATA_VALID: &str = "DataValid";
pub const CONDITION_SYNC_SUCCESSFUL: &str = "SyncSuccessful";

/// Default sync interval when the policy does not specify one
pub const DEFAULT_SYNC_INTERVAL: &str = "1h";

/// MCPRegistry declares a desired MCP server registry
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "toolhive.stacklok.dev",
    version = "v1alpha1",
    kind = "MCPRegistry",
    plural = "mcpregistries",
    namespaced,
    status = "MCPRegistryStatus",
    shortname = "mcpreg",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.source.type"}"#,
    printcolumn = r#"{"name":"Servers","type":"integer","jsonPath":".status.serverCount"}"#,
    printcolumn = r#"{"name":"Last Sync","type":"date","jsonPath":".status.lastSyncTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MCPRegistrySpec {
    /// Human-readable name for the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Where to fetch registry data from
    pub source: MCPRegistrySource,

    /// Synchronization behavior
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncPolicy>,

    /// Criteria for including and excluding servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RegistryFilter>,
}

/// Source configuration for registry data
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MCPRegistrySource {
    /// Source type
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Registry data format; defaults to toolhive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<RegistryFormat>,

    /// ConfigMap source; only used when type is "configmap"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configmap: Option<ConfigMapSource>,

    /// HTTP(S) source; only used when type is "url"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlSource>,

    /// Git repository source; only used when type is "git"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,

    /// External registry source; only used when type is "registry"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistrySource>,
}

impl MCPRegistrySource {
    /// Effective data format, defaulting to toolhive
    pub fn effective_format(&self) -> RegistryFormat {
        self.format.unwrap_or(RegistryFormat::Toolhive)
    }
}

/// Recognized source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Configmap,
    Url,
    Git,
    Registry,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::Configmap => "configmap",
            SourceType::Url => "url",
            SourceType::Git => "git",
            SourceType::Registry => "registry",
        };
        write!(f, "{}", s)
    }
}

/// A ConfigMap holding registry data
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapSource {
    /// Name of the ConfigMap
    pub name: String,

    /// Namespace of the ConfigMap; defaults to the MCPRegistry's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Key in the ConfigMap containing the registry data
    #[serde(default = "default_registry_key")]
    pub key: String,
}

fn default_registry_key() -> String {
    crate::REGISTRY_DATA_KEY.to_string()
}

/// An HTTP(S) endpoint serving registry data
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UrlSource {
    /// Endpoint URL
    pub url: String,

    /// Optional HTTP headers sent with the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<std::collections::BTreeMap<String, String>>,

    /// TLS configuration for HTTPS requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,

    /// Authentication for the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuth>,
}

/// A Git repository holding registry data
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    /// Repository URL
    pub repository: String,

    /// Git reference: branch, tag or commit
    #[serde(default = "default_git_ref", rename = "ref")]
    pub git_ref: String,

    /// Path within the repository to the registry file
    #[serde(default = "default_registry_key")]
    pub path: String,

    /// Authentication for Git operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<GitAuth>,
}

fn default_git_ref() -> String {
    "main".to_string()
}

/// An external MCP registry
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySource {
    /// Base URL of the external registry
    pub url: String,

    /// Authentication for registry access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HttpAuth>,
}

/// TLS configuration for HTTPS sources
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// PEM-encoded CA certificate bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
}

/// HTTP authentication methods
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpAuth {
    /// Bearer token authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<SecretKeyRef>,

    /// Basic authentication; the password is resolved from the secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuth>,
}

/// Basic authentication credentials
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    pub username: String,

    /// Secret holding the password
    pub password_ref: SecretKeyRef,
}

/// Git authentication methods
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitAuth {
    /// SSH private key authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<SecretKeyRef>,

    /// Token authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretKeyRef>,
}

/// Reference to a key in a Secret
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Name of the Secret
    pub name: String,

    /// Key in the Secret
    pub key: String,

    /// Namespace of the Secret; defaults to the MCPRegistry's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Synchronization behavior
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    /// Sync policy type
    #[serde(rename = "type", default)]
    pub policy_type: SyncPolicyType,

    /// Sync interval for automatic synchronization (s/m/h units)
    #[serde(default = "default_sync_interval")]
    pub interval: String,

    /// Retry behavior for failed syncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_sync_interval() -> String {
    DEFAULT_SYNC_INTERVAL.to_string()
}

/// Sync policy types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicyType {
    #[default]
    Manual,
    Automatic,
}

/// Retry behavior for failed syncs
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Base interval between retries (s/m/h units)
    #[serde(default = "default_backoff_interval")]
    pub backoff_interval: String,

    /// Multiplier for exponential backoff
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: String,
}

fn default_max_attempts() -> i32 {
    3
}

fn default_backoff_interval() -> String {
    "30s".to_string()
}

fn default_backoff_multiplier() -> String {
    "2.0".to_string()
}

/// Server filtering criteria
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFilter {
    /// Name-based filtering with glob patterns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_filters: Option<NameFilter>,

    /// Tag-based filtering with exact matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagFilter>,
}

/// Glob patterns applied to server names
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NameFilter {
    /// Patterns a name must match at least one of, when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Patterns a name must match none of
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Exact tags applied to server tag sets
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagFilter {
    /// Tags that must all be present, when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Tags that must not be present
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Observed state of an MCPRegistry
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MCPRegistryStatus {
    /// Current lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<MCPRegistryPhase>,

    /// Additional information about the current phase
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Latest available observations of the registry's state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Timestamp of the last successful synchronization (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,

    /// Hash of the source payload from the last successful sync
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_sync_hash: String,

    /// Number of servers currently in the registry, after filtering
    #[serde(default)]
    pub server_count: i32,

    /// Sync attempts for the current operation; reset to zero on success
    #[serde(default)]
    pub sync_attempts: i32,

    /// Earliest time the next retry may run (RFC 3339); cleared on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_time: Option<String>,

    /// Reference to the stored registry data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_ref: Option<StorageReference>,

    /// Last manual sync trigger value that was processed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_manual_sync_trigger: String,

    /// Stable in-cluster URL of the registry API service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
}

impl MCPRegistryStatus {
    /// Parse nextRetryTime into a timestamp, ignoring malformed values
    pub fn next_retry_after(&self) -> Option<DateTime<Utc>> {
        self.next_retry_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Parse lastSyncTime into a timestamp, ignoring malformed values
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Lifecycle phases of an MCPRegistry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MCPRegistryPhase {
    Pending,
    Syncing,
    Ready,
    Failed,
    Terminating,
}

impl std::fmt::Display for MCPRegistryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MCPRegistryPhase::Pending => "Pending",
            MCPRegistryPhase::Syncing => "Syncing",
            MCPRegistryPhase::Ready => "Ready",
            MCPRegistryPhase::Failed => "Failed",
            MCPRegistryPhase::Terminating => "Terminating",
        };
        write!(f, "{}", s)
    }
}

/// Where the synced registry data lives
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageReference {
    /// Storage type; currently always "configmap"
    #[serde(rename = "type")]
    pub storage_type: String,

    /// ConfigMap storing the registry data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ConfigMapReference>,
}

/// Reference to a ConfigMap and key
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapReference {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

/// A single observation about the registry's state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. "SourceAvailable"
    #[serde(rename = "type")]
    pub condition_type: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason for the last transition
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// When the condition last changed status (RFC 3339)
    pub last_transition_time: String,
}

/// Set or update a condition in place
///
/// The transition time is only refreshed when the status value actually
/// changes; updating reason or message alone preserves it.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    let stamped = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == condition_type)
    {
        if existing.status != status {
            existing.last_transition_time = stamped;
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        return;
    }

    conditions.push(Condition {
        condition_type: condition_type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: stamped,
    });
}

impl MCPRegistry {
    /// Value of the manual sync trigger annotation, when present and non-empty
    pub fn manual_sync_trigger(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(SYNC_TRIGGER_ANNOTATION))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Current phase, when status has been initialized
    pub fn phase(&self) -> Option<MCPRegistryPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Configured sync interval, defaulting to one hour
    pub fn sync_interval(&self) -> RegistryResult<std::time::Duration> {
        let interval = self
            .spec
            .sync_policy
            .as_ref()
            .map(|p| p.interval.as_str())
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_SYNC_INTERVAL);
        parse_duration(interval)
    }

    /// Whether the sync policy is automatic
    pub fn is_automatic_sync(&self) -> bool {
        self.spec
            .sync_policy
            .as_ref()
            .map(|p| p.policy_type == SyncPolicyType::Automatic)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_registry() -> MCPRegistry {
        let spec = MCPRegistrySpec {
            display_name: None,
            source: MCPRegistrySource {
                source_type: SourceType::Configmap,
                format: None,
                configmap: Some(ConfigMapSource {
                    name: "registry-data".to_string(),
                    namespace: None,
                    key: default_registry_key(),
                }),
                url: None,
                git: None,
                registry: None,
            },
            sync_policy: None,
            filter: None,
        };
        MCPRegistry::new("test-registry", spec)
    }

    #[test]
    fn test_default_format_is_toolhive() {
        let registry = minimal_registry();
        assert_eq!(
            registry.spec.source.effective_format(),
            RegistryFormat::Toolhive
        );
    }

    #[test]
    fn test_default_sync_interval() {
        let registry = minimal_registry();
        assert_eq!(
            registry.sync_interval().unwrap(),
            std::time::Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_manual_sync_trigger_ignores_empty_values() {
        let mut registry = minimal_registry();
        assert_eq!(registry.manual_sync_trigger(), None);

        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert(SYNC_TRIGGER_ANNOTATION.to_string(), String::new());
        registry.metadata.annotations = Some(annotations.clone());
        assert_eq!(registry.manual_sync_trigger(), None);

        annotations.insert(SYNC_TRIGGER_ANNOTATION.to_string(), "2024-01-01".to_string());
        registry.metadata.annotations = Some(annotations);
        assert_eq!(registry.manual_sync_trigger(), Some("2024-01-01"));
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let yaml = r#"
            source:
              type: configmap
              configmap:
                name: registry-data
            syncPolicy:
              type: automatic
              interval: 5m
        "#;
        let spec: MCPRegistrySpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.source.source_type, SourceType::Configmap);
        assert_eq!(spec.source.configmap.as_ref().unwrap().key, "registry.json");
        let policy = spec.sync_policy.unwrap();
        assert_eq!(policy.policy_type, SyncPolicyType::Automatic);
        assert_eq!(policy.interval, "5m");
    }

    #[test]
    fn test_set_condition_preserves_transition_time_on_same_status() {
        let mut conditions = Vec::new();
        let t0 = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t1 = t0 + chrono::Duration::hours(1);

        set_condition(
            &mut conditions,
            CONDITION_SYNC_SUCCESSFUL,
            "True",
            "SyncCompleted",
            "ok",
            t0,
        );
        let first_transition = conditions[0].last_transition_time.clone();

        // Same status, new reason: transition time must not move.
        set_condition(
            &mut conditions,
            CONDITION_SYNC_SUCCESSFUL,
            "True",
            "SyncCompleted",
            "still ok",
            t1,
        );
        assert_eq!(conditions[0].last_transition_time, first_transition);
        assert_eq!(conditions[0].message, "still ok");

        // Status flip: transition time moves forward.
        set_condition(
            &mut conditions,
            CONDITION_SYNC_SUCCESSFUL,
            "False",
            "FetchFailed",
            "boom",
            t1,
        );
        assert!(conditions[0].last_transition_time > first_transition);
        assert_eq!(conditions.len(), 1);
    }
}
