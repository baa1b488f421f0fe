//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Per-registry read-only HTTP API
//!
//! Serves the synced registry data for a single MCPRegistry: registry
//! metadata, the server list and individual servers, with on-demand
//! conversion between the toolhive and upstream formats.

pub mod config;
pub mod error;
pub mod handlers;
pub mod provider;
pub mod responses;
pub mod server;

// Re-export main types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use provider::{KubeRegistryDataProvider, ProviderError, RegistryDataProvider};
pub use server::RegistryApiServer;

/// Service name reported by the API
pub const REGISTRY_API_NAME: &str = "thv-registry-api";
