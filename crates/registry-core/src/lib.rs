//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Core types for the MCP registry operator
//!
//! This crate provides the canonical registry data model, format detection
//! and conversion, server filtering, and the MCPRegistry custom resource
//! types shared by the controller and the registry API service.

pub mod conversion;
pub mod duration;
pub mod error;
pub mod filtering;
pub mod types;
pub mod v1alpha1;

// Re-export main types
pub use conversion::{ConversionOutcome, RegistryFormat};
pub use error::{RegistryError, RegistryResult};
pub use filtering::apply_filters;
pub use types::{ImageServer, Registry, RemoteServer, Transport};
pub use v1alpha1::{MCPRegistry, MCPRegistryPhase, MCPRegistrySpec, MCPRegistryStatus};

/// Key under which registry data is stored in source and storage ConfigMaps
pub const REGISTRY_DATA_KEY: &str = "registry.json";

/// Annotation whose value change requests a manual sync
pub const SYNC_TRIGGER_ANNOTATION: &str = "toolhive.stacklok.dev/sync-trigger";

/// Registry schema version stamped on converted registries
pub const CANONICAL_REGISTRY_VERSION: &str = "1.0.0";
