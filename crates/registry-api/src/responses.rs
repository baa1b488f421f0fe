//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Response bodies for the registry API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use registry_core::v1alpha1::SyncPolicy;

/// Response for `GET /api/v1/registry/info`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    pub format: String,

    pub source: RegistrySourceInfo,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RegistryStatusInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncPolicy>,
}

/// Source block of the info response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySourceInfo {
    #[serde(rename = "type")]
    pub source_type: String,
    pub format: String,
}

/// Status block of the info response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatusInfo {
    pub phase: String,

    pub server_count: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response for `GET /api/v1/registry/servers`
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerListResponse {
    pub servers: BTreeMap<String, serde_json::Value>,
    pub count: usize,
    pub format: String,
}

/// Response for `GET /api/v1/registry/servers/{name}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerResponse {
    pub name: String,
    pub server: serde_json::Value,
    pub format: String,
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub message: String,

    pub code: u16,
}
